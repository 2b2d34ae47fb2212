//! Request and response payloads of the runtime host protocol.

use crate::checktx::CheckTxResult;
use crate::commitment::{BlockHeader, ComputeResultsHeader};
use crate::storage::WriteLog;
use crate::types::{Hash, Namespace, Root, Version};

/// Consensus layer block the request is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsensusBlock {
    pub height: u64,
}

/// Last finalized runtime block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
}

/// Payload for responses that carry nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExecuteTxBatchRequest {
    pub consensus_block: ConsensusBlock,
    /// Block the new round builds on; the batch executes in `block.header.round + 1`.
    pub block: Block,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub max_messages: u32,
    pub inputs: Vec<Vec<u8>>,
    #[serde(default)]
    pub in_msgs: Vec<Vec<u8>>,
}

/// Results of executing one batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ComputedBatch {
    pub header: ComputeResultsHeader,
    pub io_write_log: WriteLog,
    pub state_write_log: WriteLog,
    /// Messages emitted towards the consensus layer.
    #[serde(default)]
    pub messages: Vec<Vec<u8>>,
    /// Signature over the header by the runtime attestation key, when running in a TEE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rak_sig: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExecuteTxBatchResponse {
    pub batch: ComputedBatch,
    /// Hash of every executed transaction, in batch order.
    pub tx_hashes: Vec<Hash>,
    pub tx_input_root: Root,
    pub tx_input_write_log: WriteLog,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CheckTxBatchRequest {
    pub consensus_block: ConsensusBlock,
    pub inputs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CheckTxBatchResponse {
    pub results: Vec<CheckTxResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryRequest {
    pub consensus_block: ConsensusBlock,
    pub method: String,
    #[serde(default, with = "serde_bytes")]
    pub args: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryResponse {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsensusSyncRequest {
    pub height: u64,
}

/// Handshake request sent once after the runtime starts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeInfoRequest {
    pub runtime_id: Namespace,
    pub protocol_version: Version,
}

/// Host-driven scheduling support declared by a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeatureScheduleControl {
    pub initial_batch_size: u32,
}

/// Optional capabilities a runtime declares during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Features {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_control: Option<FeatureScheduleControl>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeInfoResponse {
    pub protocol_version: Version,
    pub runtime_version: Version,
    #[serde(default)]
    pub features: Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TeeHardware {
    IntelSgx,
    IntelTdx,
}

/// Attestation capability of a runtime running inside a trusted execution environment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CapabilityTee {
    pub hardware: TeeHardware,
    /// Runtime attestation key.
    pub rak: [u8; 32],
    #[serde(with = "serde_bytes")]
    pub attestation: Vec<u8>,
}
