//! Batch tree scoped to a single batch.
//!
//! Key layout (all under one authenticated tree):
//! - `'T' || H(input) || 0x01` -> input artifacts: length-prefixed input, then batch order (u32 BE)
//! - `'T' || H(input) || 0x02` -> output
//! - `'E' || len(tag.key) || tag.key || H(input)` -> tag value
//!
//! Batch order is part of the input artifact, so the same transactions in a different
//! order produce a different root.

use std::collections::HashSet;

use super::{Tags, Transaction};
use crate::context::CallContext;
use crate::error::HostError;
use crate::storage::{AuthenticatedTree, StorageError, WriteLog};
use crate::types::{Hash, Namespace, Root, RootKind, Round};

/// Key prefix of transaction artifacts.
pub const TX_PREFIX: u8 = b'T';
/// Key prefix of tags.
pub const TAG_PREFIX: u8 = b'E';

const KIND_INPUT: u8 = 0x01;
const KIND_OUTPUT: u8 = 0x02;

fn artifact_key(tx_hash: &Hash, kind: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + tx_hash.0.len());
    key.push(TX_PREFIX);
    key.extend_from_slice(&tx_hash.0);
    key.push(kind);
    key
}

fn tag_key(tag_key: &[u8], tx_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + tag_key.len() + tx_hash.0.len());
    key.push(TAG_PREFIX);
    key.extend_from_slice(&(tag_key.len() as u32).to_be_bytes());
    key.extend_from_slice(tag_key);
    key.extend_from_slice(&tx_hash.0);
    key
}

fn input_artifacts(input: &[u8], batch_order: u32) -> Vec<u8> {
    let mut value = Vec::with_capacity(8 + input.len() + 4);
    value.extend_from_slice(&(input.len() as u64).to_be_bytes());
    value.extend_from_slice(input);
    value.extend_from_slice(&batch_order.to_be_bytes());
    value
}

#[derive(Debug)]
enum Scope {
    Open { added: HashSet<Hash>, next_order: u32 },
    Committed,
}

/// An authenticated tree over one batch's transactions.
///
/// The tree is released when dropped, whether or not it was committed.
pub struct Tree {
    store: Option<Box<dyn AuthenticatedTree>>,
    namespace: Namespace,
    round: Round,
    kind: RootKind,
    root: Root,
    scope: Scope,
}

impl Tree {
    /// Opens a scope on `store`, which must currently be at `root`.
    pub fn new(store: Box<dyn AuthenticatedTree>, root: Root) -> Self {
        Tree {
            store: Some(store),
            namespace: root.namespace,
            round: root.round,
            kind: root.kind,
            root,
            scope: Scope::Open { added: HashSet::new(), next_order: 0 },
        }
    }

    /// Root as of the last commit (the starting root before any commit).
    pub fn root(&self) -> Root {
        self.root
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.scope, Scope::Committed)
    }

    fn store(&mut self) -> Result<&mut Box<dyn AuthenticatedTree>, StorageError> {
        self.store.as_mut().ok_or(StorageError::Closed)
    }

    /// Adds a transaction at the next batch position.
    ///
    /// Tags are written only for executed transactions (those with an output).
    pub fn add_transaction(
        &mut self,
        ctx: &CallContext,
        tx: &Transaction,
        tags: &Tags,
    ) -> Result<(), HostError> {
        ctx.check()?;

        let tx_hash = tx.hash();
        let batch_order = match &mut self.scope {
            Scope::Committed => return Err(StorageError::AlreadyCommitted.into()),
            Scope::Open { added, next_order } => {
                if !added.insert(tx_hash) {
                    return Err(StorageError::DuplicateTransaction(tx_hash).into());
                }
                let order = *next_order;
                *next_order = next_order
                    .checked_add(1)
                    .ok_or_else(|| HostError::Execution("batch too large".into()))?;
                order
            }
        };

        let store = self.store()?;
        store.insert(&artifact_key(&tx_hash, KIND_INPUT), &input_artifacts(&tx.input, batch_order))?;
        if let Some(output) = &tx.output {
            store.insert(&artifact_key(&tx_hash, KIND_OUTPUT), output)?;
            for tag in tags {
                store.insert(&tag_key(&tag.key, &tx_hash), &tag.value)?;
            }
        }
        Ok(())
    }

    /// Finalizes the scope and returns its write log and root.
    ///
    /// A second commit of the same scope returns an empty write log and the same root.
    pub fn commit(&mut self, ctx: &CallContext) -> Result<(WriteLog, Root), HostError> {
        if self.is_committed() {
            return Ok((WriteLog::new(), self.root));
        }
        ctx.check()?;

        let (write_log, hash) = self.store()?.commit()?;
        self.root = Root { namespace: self.namespace, round: self.round, kind: self.kind, hash };
        self.scope = Scope::Committed;

        tracing::debug!(round = self.round, kind = ?self.kind, log = write_log.len(), root = %hash, "batch tree committed");
        Ok((write_log, self.root))
    }

    /// Opens a new scope continuing from this scope's committed root.
    pub fn next_scope(mut self, kind: RootKind) -> Result<Tree, StorageError> {
        if !self.is_committed() {
            return Err(StorageError::NotCommitted);
        }
        let store = self.store.take().ok_or(StorageError::Closed)?;
        let root = Root { kind, ..self.root };
        Ok(Tree::new(store, root))
    }

    /// Releases the underlying store.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.close();
            tracing::trace!(round = self.round, "batch tree released");
        }
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("scope", &self.scope)
            .field("released", &self.store.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::storage::{MemoryTreeProvider, TreeProvider};
    use crate::transaction::Tag;

    fn new_tree(provider: &MemoryTreeProvider) -> Tree {
        let root = Root::empty(Namespace([7u8; 32]), 1, RootKind::Input);
        Tree::new(provider.open().unwrap(), root)
    }

    fn commit_inputs(inputs: &[&[u8]]) -> Root {
        let provider = MemoryTreeProvider::new();
        let mut tree = new_tree(&provider);
        let ctx = CallContext::background();
        for input in inputs {
            tree.add_transaction(&ctx, &Transaction::input(*input), &Tags::new()).unwrap();
        }
        tree.commit(&ctx).unwrap().1
    }

    #[test]
    fn test_empty_commit_is_empty_root() {
        let root = commit_inputs(&[]);
        assert!(root.is_empty());
        assert_eq!(root.kind, RootKind::Input);
        assert_eq!(root.round, 1);
    }

    #[test]
    fn test_order_changes_root() {
        let ab = commit_inputs(&[&b"a"[..], &b"b"[..]]);
        let ba = commit_inputs(&[&b"b"[..], &b"a"[..]]);
        assert_ne!(ab.hash, ba.hash);
        assert_eq!(ab, commit_inputs(&[&b"a"[..], &b"b"[..]]));
    }

    #[test]
    fn test_insert_after_commit_fails() {
        let provider = MemoryTreeProvider::new();
        let mut tree = new_tree(&provider);
        let ctx = CallContext::background();
        tree.add_transaction(&ctx, &Transaction::input(b"a".to_vec()), &Tags::new()).unwrap();
        let (_, root) = tree.commit(&ctx).unwrap();

        let (log, again) = tree.commit(&ctx).unwrap();
        assert!(log.is_empty());
        assert_eq!(root, again);

        let err = tree.add_transaction(&ctx, &Transaction::input(b"b".to_vec()), &Tags::new()).unwrap_err();
        assert_eq!(err, HostError::Storage(StorageError::AlreadyCommitted));
    }

    #[test]
    fn test_duplicate_transaction_rejected() {
        let provider = MemoryTreeProvider::new();
        let mut tree = new_tree(&provider);
        let ctx = CallContext::background();
        let tx = Transaction::input(b"a".to_vec());
        tree.add_transaction(&ctx, &tx, &Tags::new()).unwrap();
        assert_eq!(
            tree.add_transaction(&ctx, &tx, &Tags::new()),
            Err(HostError::Storage(StorageError::DuplicateTransaction(tx.hash())))
        );
    }

    #[test]
    fn test_next_scope_requires_commit() {
        let provider = MemoryTreeProvider::new();
        let tree = new_tree(&provider);
        assert_eq!(tree.next_scope(RootKind::Output).unwrap_err(), StorageError::NotCommitted);
        assert_eq!(provider.open_trees(), 0);
    }

    #[test]
    fn test_output_scope_extends_input_root() {
        let provider = MemoryTreeProvider::new();
        let ctx = CallContext::background();
        let tags = vec![Tag::new(b"k".to_vec(), b"v".to_vec())];

        let mut tree = new_tree(&provider);
        tree.add_transaction(&ctx, &Transaction::input(b"a".to_vec()), &tags).unwrap();
        let (input_log, input_root) = tree.commit(&ctx).unwrap();
        // Tags are only written alongside outputs.
        assert_eq!(input_log.len(), 1);

        let mut tree = tree.next_scope(RootKind::Output).unwrap();
        assert_eq!(provider.open_trees(), 1);
        tree.add_transaction(&ctx, &Transaction::executed(b"a".to_vec(), b"out".to_vec()), &tags).unwrap();
        let (io_log, io_root) = tree.commit(&ctx).unwrap();

        // Input artifact is unchanged, so only the output and the tag are logged.
        assert_eq!(io_log.len(), 2);
        assert_eq!(io_root.kind, RootKind::Output);
        assert_ne!(io_root.hash, input_root.hash);
        drop(tree);
        assert_eq!(provider.open_trees(), 0);
    }

    #[test]
    fn test_cancelled_context_aborts_insert_and_commit() {
        let provider = MemoryTreeProvider::new();
        let mut tree = new_tree(&provider);
        let token = CancelToken::new();
        let ctx = CallContext::with_cancel(token.clone());
        tree.add_transaction(&ctx, &Transaction::input(b"a".to_vec()), &Tags::new()).unwrap();
        token.cancel();
        assert_eq!(
            tree.add_transaction(&ctx, &Transaction::input(b"b".to_vec()), &Tags::new()),
            Err(HostError::Cancelled)
        );
        assert_eq!(tree.commit(&ctx).unwrap_err(), HostError::Cancelled);
        assert!(!tree.is_committed());
        tree.close();
        assert_eq!(provider.open_trees(), 0);
    }

    #[test]
    fn test_storage_failure_propagates() {
        let provider = MemoryTreeProvider::failing_after(1);
        let mut tree = new_tree(&provider);
        let ctx = CallContext::background();
        tree.add_transaction(&ctx, &Transaction::input(b"a".to_vec()), &Tags::new()).unwrap();
        let err = tree.add_transaction(&ctx, &Transaction::input(b"b".to_vec()), &Tags::new()).unwrap_err();
        assert!(matches!(err, HostError::Storage(StorageError::Unavailable(_))));
    }
}
