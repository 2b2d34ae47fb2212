//!
//! Storage collaborator boundary.
//!
//! The host never depends on a concrete Merkle key-value store; it only needs an
//! authenticated tree it can insert into, commit, and release. `memory` provides the
//! in-process implementation used by the mock runtime and the tests.

pub mod memory;

pub use memory::{MemoryTree, MemoryTreeProvider};

use crate::types::Hash;

/// One key/value mutation produced by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

/// Ordered mutations that take a tree from its previous root to the committed one.
pub type WriteLog = Vec<LogEntry>;

/// Errors raised by the storage collaborator or by tree scoping rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The tree was already released.
    #[error("tree is closed")]
    Closed,
    /// Insert into a scope that has already been committed.
    #[error("tree scope already committed")]
    AlreadyCommitted,
    /// Next scope requested before the current one was committed.
    #[error("tree scope not committed")]
    NotCommitted,
    /// The same transaction was added twice in one scope.
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(Hash),
    /// The backing store cannot serve the request.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A storage failure reported by a remote runtime.
    #[error("{0}")]
    Remote(String),
}

/// Authenticated tree capability consumed from the storage layer.
///
/// A tree is owned by exactly one batch; callers serialize access themselves.
pub trait AuthenticatedTree: Send {
    /// Stages `value` under `key`.
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Applies all staged inserts and returns the resulting write log and root hash.
    ///
    /// Committing with nothing staged returns an empty write log and the same root.
    fn commit(&mut self) -> Result<(WriteLog, Hash), StorageError>;

    /// Releases the tree's resources. Safe to call more than once.
    fn close(&mut self);
}

/// Hands out fresh trees, one per batch.
pub trait TreeProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn AuthenticatedTree>, StorageError>;
}
