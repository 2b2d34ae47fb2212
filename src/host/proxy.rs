//!
//! Runtime proxy that speaks the wire protocol to a runtime in another process.
//!
//! The transport is supplied by the caller as a `Connection`. Each request is framed as a
//! `Message` with a fresh id; the reply must echo that id. Errors reported by the remote
//! runtime surface as `HostError::Runtime` unless they map back onto a host error kind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::events::{Event, EventSubscription, StartedEvent};
use super::lifecycle::Lifecycle;
use super::Runtime;
use crate::context::CallContext;
use crate::error::{HostError, ProtocolError};
use crate::protocol::{
    Body, CapabilityTee, Empty, Message, MessageType, RuntimeInfoRequest, RuntimeInfoResponse,
    METHOD_CHECK_TX_BATCH_RESPONSE, METHOD_CONSENSUS_SYNC_RESPONSE,
    METHOD_EXECUTE_TX_BATCH_RESPONSE, METHOD_QUERY_RESPONSE,
};
use crate::types::{Namespace, Version, RUNTIME_HOST_PROTOCOL};

/// Upper bound on the startup handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A request/response transport to a remote runtime.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Sends one encoded request frame and returns the encoded response frame.
    async fn round_trip(&self, frame: Vec<u8>) -> Result<Vec<u8>, HostError>;
}

/// Response variant expected for a forwarded request, or `None` if it is not forwarded.
fn expected_response(body: &Body) -> Option<&'static str> {
    match body {
        Body::ExecuteTxBatchRequest(_) => Some(METHOD_EXECUTE_TX_BATCH_RESPONSE),
        Body::CheckTxBatchRequest(_) => Some(METHOD_CHECK_TX_BATCH_RESPONSE),
        Body::QueryRequest(_) => Some(METHOD_QUERY_RESPONSE),
        Body::ConsensusSyncRequest(_) => Some(METHOD_CONSENSUS_SYNC_RESPONSE),
        _ => None,
    }
}

pub struct ProxyRuntime {
    id: Namespace,
    conn: Arc<dyn Connection>,
    next_id: AtomicU64,
    info: Mutex<Option<RuntimeInfoResponse>>,
    lifecycle: Lifecycle,
}

impl ProxyRuntime {
    pub fn new(id: Namespace, conn: Arc<dyn Connection>, event_buffer: usize) -> Self {
        ProxyRuntime {
            id,
            conn,
            next_id: AtomicU64::new(0),
            info: Mutex::new(None),
            lifecycle: Lifecycle::new(event_buffer),
        }
    }

    fn negotiated(&self) -> std::sync::MutexGuard<'_, Option<RuntimeInfoResponse>> {
        self.info.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn request(&self, ctx: &CallContext, body: Body) -> Result<Body, HostError> {
        ctx.check()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Message::request(id, body).encode()?;

        let reply = tokio::select! {
            reply = self.conn.round_trip(frame) => reply?,
            _ = ctx.cancelled() => {
                tracing::debug!(request = id, "request abandoned");
                return Err(HostError::Cancelled);
            }
        };
        ctx.check()?;

        let message = Message::decode(&reply)?;
        if message.message_type != MessageType::Response || message.id != id {
            return Err(HostError::Codec(format!(
                "unexpected reply {:?} #{} to request #{}",
                message.message_type, message.id, id
            )));
        }
        message.into_result()
    }

    async fn handshake(&self) -> Result<RuntimeInfoResponse, HostError> {
        let ctx = CallContext::with_timeout(HANDSHAKE_TIMEOUT);
        let request = RuntimeInfoRequest { runtime_id: self.id, protocol_version: RUNTIME_HOST_PROTOCOL };
        let info = match self.request(&ctx, Body::InfoRequest(request)).await? {
            Body::InfoResponse(info) => info,
            other => {
                return Err(HostError::Codec(format!("handshake answered with {}", other.method())));
            }
        };
        if !info.protocol_version.is_compatible_with(&RUNTIME_HOST_PROTOCOL) {
            return Err(ProtocolError::Incompatible(format!(
                "runtime speaks protocol {}, host speaks {}",
                info.protocol_version, RUNTIME_HOST_PROTOCOL
            ))
            .into());
        }
        Ok(info)
    }
}

impl std::fmt::Debug for ProxyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRuntime").field("id", &self.id).finish_non_exhaustive()
    }
}

#[async_trait]
impl Runtime for ProxyRuntime {
    fn id(&self) -> Namespace {
        self.id
    }

    async fn get_info(&self, ctx: &CallContext) -> Result<RuntimeInfoResponse, HostError> {
        let _call = self.lifecycle.begin_call(ctx).await?;
        self.negotiated().clone().ok_or(HostError::NotReady)
    }

    fn get_active_version(&self) -> Option<Version> {
        self.negotiated().as_ref().map(|info| info.runtime_version)
    }

    fn get_capability_tee(&self) -> Option<CapabilityTee> {
        None
    }

    async fn call(&self, ctx: &CallContext, body: Body) -> Result<Body, HostError> {
        let call = self.lifecycle.begin_call(ctx).await?;
        let expected = expected_response(&body)
            .ok_or_else(|| ProtocolError::UnsupportedMethod(body.method().to_string()))?;

        let response = self.request(&call.ctx, body).await?;
        if response.method() != expected {
            return Err(HostError::Codec(format!("expected {}, got {}", expected, response.method())));
        }
        Ok(response)
    }

    fn update_capability_tee(&self) {
        tracing::debug!(runtime = %self.id, "remote runtime has no TEE capability to refresh");
    }

    fn watch_events(&self) -> (mpsc::Receiver<Event>, EventSubscription) {
        self.lifecycle.watch()
    }

    async fn start(&self) {
        let mut transition = self.lifecycle.transition(false).await;
        if transition.is_running() {
            tracing::debug!(runtime = %self.id, "start requested while running");
            return;
        }
        match self.handshake().await {
            Ok(info) => {
                let version = info.runtime_version;
                *self.negotiated() = Some(info);
                transition.started(StartedEvent { version, capability_tee: None });
            }
            Err(err) => transition.failed(err.to_string()),
        }
    }

    async fn abort(&self, ctx: &CallContext, force: bool) -> Result<(), HostError> {
        if force {
            if self.lifecycle.transition(true).await.stopped() {
                *self.negotiated() = None;
            }
            return Ok(());
        }
        if !self.lifecycle.is_running().await {
            return Ok(());
        }
        self.lifecycle.interrupt().await;
        match self.request(ctx, Body::AbortRequest(Empty {})).await? {
            Body::AbortResponse(_) => Ok(()),
            other => Err(HostError::Codec(format!("abort answered with {}", other.method()))),
        }
    }

    async fn stop(&self) {
        if self.lifecycle.transition(false).await.stopped() {
            *self.negotiated() = None;
        } else {
            tracing::debug!(runtime = %self.id, "stop requested while stopped");
        }
    }
}
