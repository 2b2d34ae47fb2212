//!
//! Runtime capability interface.
//!
//! A `Runtime` is anything that can execute batches on behalf of the node: the in-process
//! `MockRuntime`, or a `ProxyRuntime` forwarding to a remote process. Callers depend on
//! the trait only. The serving half (`handle_message`, `serve_frame`) lets any runtime
//! answer framed protocol messages, so a proxy can talk to a runtime over any transport.

pub mod events;
mod lifecycle;
pub mod mock;
pub mod proxy;


use async_trait::async_trait;
use tokio::sync::mpsc;

pub use events::{Broker, Event, EventSubscription, StartedEvent, Subscription};
pub use mock::MockRuntime;
pub use proxy::{Connection, ProxyRuntime};

use crate::context::CallContext;
use crate::error::{HostError, ProtocolError};
use crate::protocol::{
    Body, CapabilityTee, Empty, Message, MessageType, RawBody, RuntimeInfoRequest,
    RuntimeInfoResponse,
};
use crate::types::{Namespace, Version, RUNTIME_HOST_PROTOCOL};

/// A hosted runtime.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Namespace of the runtime. Never blocks.
    fn id(&self) -> Namespace;

    /// Versions and features negotiated when the runtime started.
    async fn get_info(&self, ctx: &CallContext) -> Result<RuntimeInfoResponse, HostError>;

    /// Version the runtime is running, if it has selected one.
    fn get_active_version(&self) -> Option<Version>;

    /// Attestation capability; `None` outside a TEE.
    fn get_capability_tee(&self) -> Option<CapabilityTee>;

    /// Dispatches one request and returns the matching response.
    ///
    /// Fails with `NotReady` unless the runtime has started, and with `Cancelled` when
    /// `ctx` or an `abort` cancels the call.
    async fn call(&self, ctx: &CallContext, body: Body) -> Result<Body, HostError>;

    /// Requests re-attestation. Fire-and-forget.
    fn update_capability_tee(&self);

    /// Subscribes to lifecycle events published from now on.
    fn watch_events(&self) -> (mpsc::Receiver<Event>, EventSubscription);

    /// Starts the runtime. A no-op when already running.
    async fn start(&self);

    /// Halts in-flight calls. With `force` the runtime is also stopped.
    async fn abort(&self, ctx: &CallContext, force: bool) -> Result<(), HostError>;

    /// Stops the runtime after in-flight calls finish. A no-op when already stopped.
    async fn stop(&self);
}

/// Validates a wire body and dispatches it.
///
/// A malformed body is rejected here, before the runtime sees it.
pub async fn call_raw(rt: &dyn Runtime, ctx: &CallContext, raw: RawBody) -> Result<Body, HostError> {
    let body = Body::try_from(raw).map_err(|err| {
        tracing::warn!(error = %err, "rejecting malformed request");
        HostError::from(err)
    })?;
    rt.call(ctx, body).await
}

async fn negotiate(
    rt: &dyn Runtime,
    ctx: &CallContext,
    request: RuntimeInfoRequest,
) -> Result<RuntimeInfoResponse, HostError> {
    if request.runtime_id != rt.id() {
        return Err(ProtocolError::Incompatible(format!(
            "runtime {} requested, serving {}",
            request.runtime_id,
            rt.id()
        ))
        .into());
    }
    if !request.protocol_version.is_compatible_with(&RUNTIME_HOST_PROTOCOL) {
        return Err(ProtocolError::Incompatible(format!(
            "protocol {} requested, serving {}",
            request.protocol_version, RUNTIME_HOST_PROTOCOL
        ))
        .into());
    }
    rt.get_info(ctx).await
}

/// Answers one framed request on behalf of `rt`.
///
/// Info and abort requests map onto the lifecycle methods; everything else goes to
/// `call`. Failures are returned as an `Error` body with the request's id.
pub async fn handle_message(rt: &dyn Runtime, ctx: &CallContext, message: Message) -> Message {
    let id = message.id;
    if message.message_type != MessageType::Request {
        let err = ProtocolError::UnsupportedMethod("response sent as request".into());
        return Message::response(id, Err(err.into()));
    }

    let result = match Body::try_from(message.body) {
        Err(err) => {
            tracing::warn!(id, error = %err, "rejecting malformed request");
            Err(err.into())
        }
        Ok(Body::InfoRequest(request)) => negotiate(rt, ctx, request).await.map(Body::InfoResponse),
        Ok(Body::AbortRequest(_)) => rt.abort(ctx, false).await.map(|()| Body::AbortResponse(Empty {})),
        Ok(body) => rt.call(ctx, body).await,
    };
    if let Err(err) = &result {
        tracing::debug!(id, error = %err, "request failed");
    }
    Message::response(id, result)
}

/// Decodes a request frame, answers it, and encodes the response frame.
pub async fn serve_frame(rt: &dyn Runtime, ctx: &CallContext, frame: &[u8]) -> Result<Vec<u8>, HostError> {
    let message = Message::decode(frame)?;
    handle_message(rt, ctx, message).await.encode()
}
