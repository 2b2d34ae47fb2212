//! In-memory authenticated tree.
//!
//! Entries are kept sorted by key and committed into a binary Merkle tree: leaves hash
//! `(key, value)`, interior nodes hash their two children, and an odd node at the end of
//! a layer is promoted unchanged. An empty tree has root `Hash::EMPTY`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{AuthenticatedTree, LogEntry, StorageError, TreeProvider, WriteLog};
use crate::types::Hash;

const LEAF_DOMAIN: &[u8] = b"runtime-host/tree/leaf";
const NODE_DOMAIN: &[u8] = b"runtime-host/tree/node";

/// Computes the Merkle root over sorted entries.
pub fn merkle_root(entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Hash {
    if entries.is_empty() {
        return Hash::EMPTY;
    }

    let mut layer: Vec<Hash> = entries
        .iter()
        .map(|(k, v)| Hash::digest_parts(LEAF_DOMAIN, &[k.as_slice(), v.as_slice()]))
        .collect();

    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => Hash::digest_parts(NODE_DOMAIN, &[&left.0[..], &right.0[..]]),
                _ => pair[0],
            })
            .collect();
    }
    layer[0]
}

#[derive(Debug)]
pub struct MemoryTree {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
    root: Hash,
    closed: bool,
    open_trees: Option<Arc<AtomicUsize>>,
    fail_after: Option<usize>,
    inserts: usize,
}

impl MemoryTree {
    pub fn new() -> Self {
        MemoryTree {
            entries: BTreeMap::new(),
            pending: BTreeMap::new(),
            root: Hash::EMPTY,
            closed: false,
            open_trees: None,
            fail_after: None,
            inserts: 0,
        }
    }

    /// Root as of the last commit.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Committed value under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthenticatedTree for MemoryTree {
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if let Some(limit) = self.fail_after {
            if self.inserts >= limit {
                return Err(StorageError::Unavailable(format!(
                    "injected failure after {} inserts",
                    limit
                )));
            }
        }
        self.inserts += 1;
        self.pending.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn commit(&mut self) -> Result<(WriteLog, Hash), StorageError> {
        if self.closed {
            return Err(StorageError::Closed);
        }

        let mut write_log = WriteLog::new();
        for (key, value) in std::mem::take(&mut self.pending) {
            if self.entries.get(&key) == Some(&value) {
                continue;
            }
            write_log.push(LogEntry { key: key.clone(), value: value.clone() });
            self.entries.insert(key, value);
        }
        if !write_log.is_empty() {
            self.root = merkle_root(&self.entries);
        }

        tracing::debug!(entries = self.entries.len(), log = write_log.len(), root = %self.root, "memory tree committed");
        Ok((write_log, self.root))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        if let Some(open) = &self.open_trees {
            open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryTree {
    fn drop(&mut self) {
        self.close();
    }
}

/// Provider of `MemoryTree`s that keeps count of trees not yet released.
#[derive(Debug, Clone, Default)]
pub struct MemoryTreeProvider {
    open_trees: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl MemoryTreeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trees handed out and not yet closed.
    pub fn open_trees(&self) -> usize {
        self.open_trees.load(Ordering::SeqCst)
    }

    /// Number of trees handed out over the provider's lifetime.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryTreeProvider {
    /// Provider whose trees fail every insert after the first `inserts`.
    pub fn failing_after(inserts: usize) -> Self {
        MemoryTreeProvider { fail_after: Some(inserts), ..Self::default() }
    }
}

impl TreeProvider for MemoryTreeProvider {
    fn open(&self) -> Result<Box<dyn AuthenticatedTree>, StorageError> {
        self.open_trees.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut tree = MemoryTree::new();
        tree.open_trees = Some(self.open_trees.clone());
        tree.fail_after = self.fail_after;
        Ok(Box::new(tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_commit_yields_empty_root() {
        let mut tree = MemoryTree::new();
        let (log, root) = tree.commit().unwrap();
        assert!(log.is_empty());
        assert_eq!(root, Hash::EMPTY);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut tree = MemoryTree::new();
        tree.insert(b"a", b"1").unwrap();
        tree.insert(b"b", b"2").unwrap();
        let (log, root) = tree.commit().unwrap();
        assert_eq!(log.len(), 2);
        assert_ne!(root, Hash::EMPTY);

        let (log2, root2) = tree.commit().unwrap();
        assert!(log2.is_empty());
        assert_eq!(root, root2);
    }

    #[test]
    fn test_root_depends_on_content_not_insert_order() {
        let mut t1 = MemoryTree::new();
        t1.insert(b"a", b"1").unwrap();
        t1.insert(b"b", b"2").unwrap();
        t1.insert(b"c", b"3").unwrap();
        let mut t2 = MemoryTree::new();
        t2.insert(b"c", b"3").unwrap();
        t2.insert(b"a", b"1").unwrap();
        t2.insert(b"b", b"2").unwrap();
        assert_eq!(t1.commit().unwrap().1, t2.commit().unwrap().1);
    }

    #[test]
    fn test_unchanged_values_stay_out_of_write_log() {
        let mut tree = MemoryTree::new();
        tree.insert(b"a", b"1").unwrap();
        let (_, root) = tree.commit().unwrap();

        tree.insert(b"a", b"1").unwrap();
        tree.insert(b"b", b"2").unwrap();
        let (log, root2) = tree.commit().unwrap();
        assert_eq!(log, vec![LogEntry { key: b"b".to_vec(), value: b"2".to_vec() }]);
        assert_ne!(root, root2);
    }

    #[test]
    fn test_write_log_replays_to_same_root() {
        let mut tree = MemoryTree::new();
        for i in 0..7u8 {
            tree.insert(&[i], &[i, i]).unwrap();
        }
        let (log, root) = tree.commit().unwrap();

        let mut replica = MemoryTree::new();
        for entry in &log {
            replica.insert(&entry.key, &entry.value).unwrap();
        }
        assert_eq!(replica.commit().unwrap().1, root);
    }

    #[test]
    fn test_closed_tree_rejects_operations() {
        let mut tree = MemoryTree::new();
        tree.close();
        tree.close();
        assert_eq!(tree.insert(b"a", b"1"), Err(StorageError::Closed));
        assert!(matches!(tree.commit(), Err(StorageError::Closed)));
    }

    #[test]
    fn test_provider_tracks_release() {
        let provider = MemoryTreeProvider::new();
        let mut a = provider.open().unwrap();
        let b = provider.open().unwrap();
        assert_eq!(provider.open_trees(), 2);
        assert_eq!(provider.opened(), 2);
        a.close();
        assert_eq!(provider.open_trees(), 1);
        drop(b);
        assert_eq!(provider.open_trees(), 0);
        drop(a);
        assert_eq!(provider.open_trees(), 0);
    }

    #[test]
    fn test_failing_provider() {
        let provider = MemoryTreeProvider::failing_after(1);
        let mut tree = provider.open().unwrap();
        tree.insert(b"a", b"1").unwrap();
        assert!(matches!(tree.insert(b"b", b"2"), Err(StorageError::Unavailable(_))));
    }
}
