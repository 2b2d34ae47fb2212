//!
//! Transactions and the authenticated batch tree built over them.
//!
//! A batch is first committed with inputs only (the input root, known at admission
//! time) and then, in a follow-up scope, with inputs and outputs (the I/O root).

pub mod tree;

pub use tree::{Tree, TAG_PREFIX, TX_PREFIX};

use crate::types::Hash;

/// Opaque application annotation stored alongside a transaction's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Tag {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Tag { key: key.into(), value: value.into() }
    }
}

pub type Tags = Vec<Tag>;

/// A transaction in a batch. `output` is set only once the batch has executed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    #[serde(with = "serde_bytes")]
    pub input: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<u8>>,
}

impl Transaction {
    pub fn input(input: impl Into<Vec<u8>>) -> Self {
        Transaction { input: input.into(), output: None }
    }

    pub fn executed(input: impl Into<Vec<u8>>, output: impl Into<Vec<u8>>) -> Self {
        Transaction { input: input.into(), output: Some(output.into()) }
    }

    /// Content address of the transaction, derived from its input.
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.input)
    }
}
