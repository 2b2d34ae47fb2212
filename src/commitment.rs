//!
//! Block headers and the per-round compute results header that nodes commit to.
//!
//! Every field of a `ComputeResultsHeader` is a pure function of the batch and the
//! previous block. The canonical encoding is fixed-width big-endian, field by field, so
//! identical inputs yield byte-identical headers on every node.

use crate::error::ProtocolError;
use crate::types::{Hash, Namespace, Round};

const BLOCK_HEADER_DOMAIN: &[u8] = b"runtime-host/block-header";
const RESULTS_HEADER_DOMAIN: &[u8] = b"runtime-host/compute-results-header";
const MESSAGES_DOMAIN: &[u8] = b"runtime-host/messages";

/// Digest over an ordered list of runtime messages; `Hash::EMPTY` when there are none.
pub fn messages_hash(messages: &[Vec<u8>]) -> Hash {
    if messages.is_empty() {
        return Hash::EMPTY;
    }
    let parts: Vec<&[u8]> = messages.iter().map(|m| m.as_slice()).collect();
    Hash::digest_parts(MESSAGES_DOMAIN, &parts)
}

/// Appends a domain tag, length-prefixed.
fn append_domain(bytes: &mut Vec<u8>, domain: &[u8]) {
    bytes.extend_from_slice(&(domain.len() as u32).to_be_bytes());
    bytes.extend_from_slice(domain);
}

fn append_hash(bytes: &mut Vec<u8>, hash: &Hash) {
    bytes.extend_from_slice(&hash.0);
}

/// Header of a runtime block, as finalized by consensus.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub namespace: Namespace,
    pub round: Round,
    /// Consensus-assigned timestamp. Carried for the chain link only; never read by execution.
    pub timestamp: u64,
    pub previous_hash: Hash,
    pub io_root: Hash,
    pub state_root: Hash,
    pub messages_hash: Hash,
    pub in_messages_hash: Hash,
}

impl BlockHeader {
    /// Header of round 0 with every root empty.
    pub fn genesis(namespace: Namespace, timestamp: u64) -> Self {
        BlockHeader {
            namespace,
            round: 0,
            timestamp,
            previous_hash: Hash::EMPTY,
            io_root: Hash::EMPTY,
            state_root: Hash::EMPTY,
            messages_hash: Hash::EMPTY,
            in_messages_hash: Hash::EMPTY,
        }
    }

    /// The header consensus would finalize for `results` on top of this block.
    pub fn next(&self, results: &ComputeResultsHeader, timestamp: u64) -> BlockHeader {
        BlockHeader {
            namespace: self.namespace,
            round: results.round,
            timestamp,
            previous_hash: results.previous_hash,
            io_root: results.io_root,
            state_root: results.state_root,
            messages_hash: results.messages_hash,
            in_messages_hash: results.in_messages_hash,
        }
    }

    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(256);
        append_domain(&mut bytes, BLOCK_HEADER_DOMAIN);
        bytes.extend_from_slice(&self.namespace.0);
        bytes.extend_from_slice(&self.round.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        append_hash(&mut bytes, &self.previous_hash);
        append_hash(&mut bytes, &self.io_root);
        append_hash(&mut bytes, &self.state_root);
        append_hash(&mut bytes, &self.messages_hash);
        append_hash(&mut bytes, &self.in_messages_hash);
        bytes
    }

    /// Hash of the canonical encoding; the `previous_hash` of the following round.
    pub fn encoded_hash(&self) -> Hash {
        Hash::digest(&self.encode())
    }
}

/// Summary of one executed batch that nodes sign and compare.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ComputeResultsHeader {
    pub round: Round,
    pub previous_hash: Hash,
    /// Root of the input-only tree, computable before execution.
    pub input_root: Hash,
    /// Root of the tree over inputs and outputs.
    pub io_root: Hash,
    pub state_root: Hash,
    pub messages_hash: Hash,
    pub in_messages_hash: Hash,
}

impl ComputeResultsHeader {
    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(256);
        append_domain(&mut bytes, RESULTS_HEADER_DOMAIN);
        bytes.extend_from_slice(&self.round.to_be_bytes());
        append_hash(&mut bytes, &self.previous_hash);
        append_hash(&mut bytes, &self.input_root);
        append_hash(&mut bytes, &self.io_root);
        append_hash(&mut bytes, &self.state_root);
        append_hash(&mut bytes, &self.messages_hash);
        append_hash(&mut bytes, &self.in_messages_hash);
        bytes
    }

    pub fn encoded_hash(&self) -> Hash {
        Hash::digest(&self.encode())
    }

    /// Whether this header directly follows `previous`.
    pub fn follows(&self, previous: &BlockHeader) -> bool {
        previous.round.checked_add(1) == Some(self.round)
            && self.previous_hash == previous.encoded_hash()
    }
}

/// Assembles a `ComputeResultsHeader`. Components not supplied stay `Hash::EMPTY`.
#[derive(Debug, Clone)]
pub struct CommitmentBuilder {
    header: ComputeResultsHeader,
}

impl CommitmentBuilder {
    pub fn new(round: Round, previous_hash: Hash) -> Self {
        CommitmentBuilder {
            header: ComputeResultsHeader {
                round,
                previous_hash,
                input_root: Hash::EMPTY,
                io_root: Hash::EMPTY,
                state_root: Hash::EMPTY,
                messages_hash: Hash::EMPTY,
                in_messages_hash: Hash::EMPTY,
            },
        }
    }

    /// Builder for the round after `previous`, linked to its hash.
    pub fn on_top_of(previous: &BlockHeader) -> Result<Self, ProtocolError> {
        let round = previous.round.checked_add(1).ok_or_else(|| {
            ProtocolError::InvalidRound(format!("round {} has no successor", previous.round))
        })?;
        Ok(Self::new(round, previous.encoded_hash()))
    }

    /// Round the header is being built for.
    pub fn round(&self) -> Round {
        self.header.round
    }

    pub fn input_root(mut self, hash: Hash) -> Self {
        self.header.input_root = hash;
        self
    }

    pub fn io_root(mut self, hash: Hash) -> Self {
        self.header.io_root = hash;
        self
    }

    pub fn state_root(mut self, hash: Hash) -> Self {
        self.header.state_root = hash;
        self
    }

    pub fn messages(mut self, messages: &[Vec<u8>]) -> Self {
        self.header.messages_hash = messages_hash(messages);
        self
    }

    pub fn in_messages(mut self, messages: &[Vec<u8>]) -> Self {
        self.header.in_messages_hash = messages_hash(messages);
        self
    }

    pub fn build(self) -> ComputeResultsHeader {
        self.header
    }
}
