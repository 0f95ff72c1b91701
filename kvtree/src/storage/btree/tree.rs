//! Versioned tree root.
//!
//! A [`Root`] is one version of the tree: a transaction id, the key count,
//! the top node, a bank of counters for the layers above, and an optional
//! diagnostic label. Committed roots are shared immutably; a writer works on
//! its own root obtained from [`Root::new_transaction_root`], which copies no
//! node until the first mutation reaches it.
//!
//! # State Machine
//!
//! Empty → (first insert) → one leaf → height grows only through a split of
//! the top node. Height never shrinks, except that erasing every key returns
//! the tree to Empty.

use std::sync::Arc;

use crate::storage::btree::branch::BranchNode;
use crate::storage::btree::leaf::LeafNode;
use crate::storage::btree::node::{CreateOrUpdateCtx, EraseOutcome, InsertOutcome, Node, NodeFind};
use crate::storage::btree::stack::{self, PathStack};

/// Number of counters in the per-root bank.
pub const ULONG_SLOTS: usize = 16;

/// Outcome of a prefix-qualified key search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindResult {
    /// The key itself was found.
    Exact,
    /// Positioned at the greatest smaller key sharing the required prefix.
    Previous,
    /// Positioned at the smallest greater key sharing the required prefix.
    Next,
    /// No key shares the required prefix on either side.
    NotFound,
}

/// Outcome of an insert-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Created,
    Updated,
}

/// One version of the tree.
#[derive(Debug, Clone)]
pub struct Root {
    transaction_id: u64,
    key_count: u64,
    top: Option<Arc<Node>>,
    ulongs: [u64; ULONG_SLOTS],
    description: Option<String>,
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

impl Root {
    /// An empty tree at transaction id 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transaction_id: 0,
            key_count: 0,
            top: None,
            ulongs: [0; ULONG_SLOTS],
            description: None,
        }
    }

    /// Root for the next writer: same nodes and counters, id + 1.
    #[must_use]
    pub fn new_transaction_root(&self) -> Self {
        Self {
            transaction_id: self.transaction_id + 1,
            key_count: self.key_count,
            top: self.top.clone(),
            ulongs: self.ulongs,
            description: None,
        }
    }

    #[must_use]
    pub const fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    #[must_use]
    pub const fn key_count(&self) -> u64 {
        self.key_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    pub(crate) const fn top(&self) -> Option<&Arc<Node>> {
        self.top.as_ref()
    }

    /// Number of levels from the top node down to the leaves.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.top.as_ref();
        while let Some(node) = current {
            height += 1;
            current = match node.as_ref() {
                Node::Branch(branch) => branch.children().first(),
                Node::Leaf(_) => None,
            };
        }
        height
    }

    /// Counter `index`, or `None` past the bank.
    #[must_use]
    pub fn ulong(&self, index: usize) -> Option<u64> {
        self.ulongs.get(index).copied()
    }

    /// Set counter `index`; returns false past the bank.
    pub fn set_ulong(&mut self, index: usize, value: u64) -> bool {
        self.ulongs.get_mut(index).map(|slot| *slot = value).is_some()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Insert or update `ctx.key`, growing the tree when the top node splits.
    pub fn create_or_update(&mut self, ctx: &mut CreateOrUpdateCtx<'_>) -> UpsertResult {
        ctx.key_index = 0;
        let split = match self.top.as_mut() {
            Some(top) => match Node::create_or_update(top, ctx) {
                InsertOutcome::Split(right) => Some((Arc::clone(top), right)),
                InsertOutcome::Done => None,
            },
            None => {
                let leaf = LeafNode::from_entries(
                    ctx.txn_id,
                    vec![(ctx.key, Arc::clone(&ctx.value))],
                    ctx.packed_key_limit,
                );
                self.top = Some(Arc::new(Node::Leaf(leaf)));
                ctx.created = true;
                None
            }
        };

        if let Some((left, right)) = split {
            let branch = BranchNode::from_children(ctx.txn_id, vec![left, right]);
            self.top = Some(Arc::new(Node::Branch(branch)));
            tracing::trace!(
                transaction_id = self.transaction_id,
                height = self.height(),
                "top node split"
            );
        }

        if ctx.created {
            self.key_count += 1;
            UpsertResult::Created
        } else {
            UpsertResult::Updated
        }
    }

    /// Erase ordinals `first..=last`; returns how many keys were removed.
    pub fn erase_range(&mut self, first: u64, last: u64) -> u64 {
        if first > last || first >= self.key_count {
            return 0;
        }
        let last = last.min(self.key_count - 1);
        let removed = last - first + 1;
        if removed == self.key_count {
            tracing::trace!(transaction_id = self.transaction_id, "tree erased to empty");
            self.top = None;
            self.key_count = 0;
            return removed;
        }
        let Some(top) = self.top.as_mut() else {
            return 0;
        };
        let outcome = Node::erase_range(top, self.transaction_id, first, last);
        debug_assert_eq!(outcome, EraseOutcome::Kept);
        self.key_count -= removed;
        removed
    }

    /// Erase the key at ordinal `index`.
    pub fn erase_one(&mut self, index: u64) -> u64 {
        if index >= self.key_count {
            return 0;
        }
        let Some(top) = self.top.as_mut() else {
            return 0;
        };
        if Node::erase_one(top, self.transaction_id, index) == EraseOutcome::Emptied {
            tracing::trace!(transaction_id = self.transaction_id, "tree erased to empty");
            self.top = None;
        }
        self.key_count -= 1;
        1
    }

    /// Search for `key`, requiring neighbours to share its first `prefix_len` bytes.
    ///
    /// On `Exact`, `Previous` and `Next`, `stack` holds the path to the found
    /// key and the returned ordinal is its index. On `NotFound` the stack is
    /// empty.
    pub fn find_key(&self, stack: &mut PathStack, key: &[u8], prefix_len: usize) -> (FindResult, u64) {
        stack.clear();
        let Some(top) = self.top.as_ref() else {
            return (FindResult::NotFound, 0);
        };
        let prefix = &key[..prefix_len.min(key.len())];
        match Node::find_key(top, stack, key) {
            NodeFind::Exact => (FindResult::Exact, stack::calc_index(stack)),
            NodeFind::Previous => {
                if shares_prefix(stack, prefix) {
                    return (FindResult::Previous, stack::calc_index(stack));
                }
                if stack::move_next(stack) && shares_prefix(stack, prefix) {
                    return (FindResult::Next, stack::calc_index(stack));
                }
                stack.clear();
                (FindResult::NotFound, 0)
            }
            NodeFind::Next => {
                if shares_prefix(stack, prefix) {
                    return (FindResult::Next, stack::calc_index(stack));
                }
                stack.clear();
                (FindResult::NotFound, 0)
            }
        }
    }

    /// Ordinal of the last key starting with `prefix`.
    #[must_use]
    pub fn find_last_with_prefix(&self, prefix: &[u8]) -> Option<u64> {
        self.top.as_ref()?.find_last_with_prefix(prefix)
    }

    /// Fill `stack` with the path to ordinal `index`; false if out of range.
    pub fn fill_stack_by_index(&self, stack: &mut PathStack, index: u64) -> bool {
        stack.clear();
        match self.top.as_ref() {
            Some(top) if index < self.key_count => {
                Node::fill_stack_by_index(top, stack, index);
                true
            }
            _ => false,
        }
    }

    /// Advance `stack` to the next key.
    pub fn find_next_key(&self, stack: &mut PathStack) -> bool {
        stack::move_next(stack)
    }

    /// Step `stack` back to the previous key.
    pub fn find_previous_key(&self, stack: &mut PathStack) -> bool {
        stack::move_previous(stack)
    }

    /// Ordinal of the key `stack` points at.
    #[must_use]
    pub fn calc_index(&self, stack: &PathStack) -> u64 {
        stack::calc_index(stack)
    }

    /// Visit every key/value in order until `visit` returns false.
    pub fn for_each(&self, mut visit: impl FnMut(&[u8], &[u8]) -> bool) {
        let Some(top) = self.top.as_ref() else {
            return;
        };
        let mut path = PathStack::new();
        Node::fill_stack_leftmost(top, &mut path);
        loop {
            if let (Some(key), Some(value)) = (stack::current_key(&path), stack::current_value(&path))
            {
                if !visit(key, &value[..]) {
                    return;
                }
            }
            if !stack::move_next(&mut path) {
                return;
            }
        }
    }

    /// CRC32 over the ordered key/value content of this version.
    #[must_use]
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        self.for_each(|key, value| {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key);
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
            true
        });
        hasher.finalize()
    }
}

fn shares_prefix(stack: &PathStack, prefix: &[u8]) -> bool {
    stack::current_key(stack).is_some_and(|key| key.starts_with(prefix))
}
