//! Branch nodes.
//!
//! A branch with `n` children stores `n - 1` separator keys and `n`
//! cumulative key counts.
//!
//! # Invariants
//!
//! - `keys[i]` equals `children[i + 1].leftmost_key()`.
//! - `counts[i]` is the total number of keys in `children[0..=i]`, so
//!   `counts[n - 1]` is the subtree's key count.
//! - At most [`MAX_CHILDREN_IN_BRANCH`] children once an operation returns.
//!
//! Erase never merges under-full siblings; a branch may shrink down to a
//! single child.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::storage::btree::leaf::compare_truncated;
use crate::storage::btree::node::{CreateOrUpdateCtx, EraseOutcome, InsertOutcome, Node};

/// Maximum fan-out of a branch before it splits.
pub const MAX_CHILDREN_IN_BRANCH: usize = 30;

/// An internal node stamped with the transaction that created it.
#[derive(Debug, Clone)]
pub struct BranchNode {
    txn_id: u64,
    keys: Vec<Box<[u8]>>,
    children: Vec<Arc<Node>>,
    counts: Vec<u64>,
}

impl BranchNode {
    /// Create a branch over `children`, deriving separators and counts.
    ///
    /// # Pre-conditions
    ///
    /// - `children` is non-empty, each child is non-empty, and the children
    ///   are in key order.
    #[must_use]
    pub fn from_children(txn_id: u64, children: Vec<Arc<Node>>) -> Self {
        let mut branch = Self {
            txn_id,
            keys: Vec::with_capacity(children.len()),
            children,
            counts: Vec::new(),
        };
        branch.rebuild_index();
        branch
    }

    #[must_use]
    pub const fn txn_id(&self) -> u64 {
        self.txn_id
    }

    pub const fn set_txn_id(&mut self, txn_id: u64) {
        self.txn_id = txn_id;
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<Node>] {
        &self.children
    }

    #[must_use]
    pub fn keys(&self) -> &[Box<[u8]>] {
        &self.keys
    }

    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    #[must_use]
    pub fn key_count(&self) -> u64 {
        self.counts.last().copied().unwrap_or(0)
    }

    /// Number of keys in the children before `child_index`.
    #[must_use]
    pub fn count_before(&self, child_index: usize) -> u64 {
        if child_index == 0 {
            0
        } else {
            self.counts[child_index - 1]
        }
    }

    /// Child whose subtree may contain `key`.
    #[must_use]
    pub fn find(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|separator| separator.as_ref() <= key)
    }

    /// Child holding the key with subtree-relative ordinal `index`.
    #[must_use]
    pub fn child_for_index(&self, index: u64) -> usize {
        self.counts.partition_point(|&count| count <= index)
    }

    /// Right-most child that can hold keys starting with `prefix`.
    #[must_use]
    pub fn find_last_with_prefix(&self, prefix: &[u8]) -> usize {
        self.keys
            .partition_point(|separator| compare_truncated(separator, prefix) != Ordering::Greater)
    }

    /// Insert or update `ctx.key` in the matching child.
    ///
    /// The caller must already have made this branch writable for `ctx.txn_id`.
    pub(crate) fn create_or_update(&mut self, ctx: &mut CreateOrUpdateCtx<'_>) -> InsertOutcome {
        let index = self.find(ctx.key);
        ctx.key_index += self.count_before(index);
        match Node::create_or_update(&mut self.children[index], ctx) {
            InsertOutcome::Split(right) => {
                self.keys.insert(index, right.leftmost_key().into());
                self.children.insert(index + 1, right);
                self.counts.insert(index + 1, 0);
                self.recompute_counts_from(index);
            }
            InsertOutcome::Done => {
                if ctx.created {
                    for count in &mut self.counts[index..] {
                        *count += 1;
                    }
                }
            }
        }

        if self.children.len() > MAX_CHILDREN_IN_BRANCH {
            let keep = self.children.len().div_ceil(2);
            InsertOutcome::Split(Arc::new(Node::Branch(self.split_off(keep))))
        } else {
            InsertOutcome::Done
        }
    }

    /// Erase subtree-relative ordinals `first..=last`.
    ///
    /// The caller handles the case where the range covers the whole branch, so
    /// at least one child survives.
    pub(crate) fn erase_range(&mut self, txn_id: u64, first: u64, last: u64) -> EraseOutcome {
        let first_child = self.child_for_index(first);
        let last_child = self.child_for_index(last);
        let mut emptied = Vec::new();

        for index in first_child..=last_child {
            let base = self.count_before(index);
            let child_last = self.counts[index] - base - 1;
            let from = first.saturating_sub(base);
            let to = (last - base).min(child_last);
            if Node::erase_range(&mut self.children[index], txn_id, from, to) == EraseOutcome::Emptied
            {
                emptied.push(index);
            }
        }

        for index in emptied.into_iter().rev() {
            self.children.remove(index);
        }
        self.rebuild_index();
        EraseOutcome::Kept
    }

    /// Move children `at..` into a new branch with the same stamp.
    fn split_off(&mut self, at: usize) -> Self {
        let children = self.children.split_off(at);
        // keys[at - 1] separates the halves; the parent re-derives it.
        let mut keys = self.keys.split_off(at - 1);
        keys.remove(0);
        let base = self.counts[at - 1];
        let counts = self.counts.split_off(at).into_iter().map(|c| c - base).collect();
        Self {
            txn_id: self.txn_id,
            keys,
            children,
            counts,
        }
    }

    fn recompute_counts_from(&mut self, index: usize) {
        let mut total = self.count_before(index);
        for (count, child) in self.counts[index..].iter_mut().zip(&self.children[index..]) {
            total += child.key_count();
            *count = total;
        }
    }

    /// Re-derive every separator and count from the children.
    fn rebuild_index(&mut self) {
        self.keys.clear();
        self.keys
            .extend(self.children.iter().skip(1).map(|child| child.leftmost_key().into()));
        self.counts.clear();
        self.counts.resize(self.children.len(), 0);
        self.recompute_counts_from(0);
    }
}
