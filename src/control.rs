//! Debug control surface: epoch advancement and node-registration waits.
//!
//! Thin pass-through. Payloads are JSON-decoded and handed to the controller unchanged.

use async_trait::async_trait;

use crate::error::{HostError, ProtocolError};
use crate::rpc::{MethodName, ServiceName};

/// Beacon epoch number.
pub type EpochTime = u64;

pub const DEBUG_SERVICE: &str = "DebugController";
pub const METHOD_SET_EPOCH: &str = "SetEpoch";
pub const METHOD_WAIT_NODES_REGISTERED: &str = "WaitNodesRegistered";

/// Methods of the debug service, in registration order.
pub fn debug_methods() -> Vec<MethodName> {
    let service = ServiceName::new(DEBUG_SERVICE);
    vec![service.method(METHOD_SET_EPOCH), service.method(METHOD_WAIT_NODES_REGISTERED)]
}

#[async_trait]
pub trait DebugController: Send + Sync {
    /// Advances the beacon to `epoch`.
    async fn set_epoch(&self, epoch: EpochTime) -> Result<(), HostError>;

    /// Blocks until `count` nodes are registered.
    async fn wait_nodes_registered(&self, count: usize) -> Result<(), HostError>;
}

/// Routes an encoded debug request to `controller` by short method name.
pub async fn dispatch(
    controller: &dyn DebugController,
    method: &str,
    payload: &[u8],
) -> Result<(), HostError> {
    tracing::debug!(method, "debug control request");
    match method {
        METHOD_SET_EPOCH => {
            let epoch: EpochTime = serde_json::from_slice(payload)?;
            controller.set_epoch(epoch).await
        }
        METHOD_WAIT_NODES_REGISTERED => {
            let count: usize = serde_json::from_slice(payload)?;
            controller.wait_nodes_registered(count).await
        }
        other => Err(ProtocolError::UnsupportedMethod(other.to_string()).into()),
    }
}
