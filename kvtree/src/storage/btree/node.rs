//! Node enum shared by the tree algorithms.
//!
//! Nodes are reference counted and may be reachable from several roots at
//! once. A node is only ever mutated through [`writable`], which clones it
//! first unless it is stamped with the active writer's transaction id.
//!
//! # Invariants
//!
//! - A node stamped with transaction id `T` is only reachable through
//!   ancestors also stamped `T`, so a committed root never reaches a node the
//!   next writer may mutate in place.

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use crate::storage::btree::branch::BranchNode;
use crate::storage::btree::leaf::LeafNode;
use crate::storage::btree::stack::{NodeIdxPair, PathStack};

/// A B-tree node.
#[derive(Debug, Clone)]
pub enum Node {
    Branch(BranchNode),
    Leaf(LeafNode),
}

/// Insert/update request threaded through one descent.
#[derive(Debug)]
pub struct CreateOrUpdateCtx<'a> {
    pub key: &'a [u8],
    pub value: Arc<[u8]>,
    pub txn_id: u64,
    pub packed_key_limit: usize,
    /// Set when the key did not exist before.
    pub created: bool,
    /// Ordinal of the key after the operation.
    pub key_index: u64,
    /// Set when some leaf on the path switched to the spread layout.
    pub demoted: bool,
}

impl<'a> CreateOrUpdateCtx<'a> {
    #[must_use]
    pub const fn new(key: &'a [u8], value: Arc<[u8]>, txn_id: u64, packed_key_limit: usize) -> Self {
        Self {
            key,
            value,
            txn_id,
            packed_key_limit,
            created: false,
            key_index: 0,
            demoted: false,
        }
    }
}

/// What a child reports back to its parent after an insert.
#[derive(Debug)]
pub enum InsertOutcome {
    /// The child absorbed the change; the parent only adjusts counts.
    Done,
    /// The child split; the new right sibling must be linked in after it.
    Split(Arc<Node>),
}

/// What a child reports back to its parent after an erase.
#[derive(Debug, PartialEq, Eq)]
pub enum EraseOutcome {
    /// Some members survive.
    Kept,
    /// Every member was erased; the parent drops the child.
    Emptied,
}

/// Result of a prefix-agnostic descent for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFind {
    /// The stack ends at the key itself.
    Exact,
    /// The stack ends at the greatest key below the probe.
    Previous,
    /// The probe sorts before every key; the stack ends at the first key.
    Next,
}

impl Node {
    #[must_use]
    pub const fn txn_id(&self) -> u64 {
        match self {
            Self::Branch(branch) => branch.txn_id(),
            Self::Leaf(leaf) => leaf.txn_id(),
        }
    }

    const fn set_txn_id(&mut self, txn_id: u64) {
        match self {
            Self::Branch(branch) => branch.set_txn_id(txn_id),
            Self::Leaf(leaf) => leaf.set_txn_id(txn_id),
        }
    }

    /// Number of keys in this subtree.
    #[must_use]
    pub fn key_count(&self) -> u64 {
        match self {
            Self::Branch(branch) => branch.key_count(),
            Self::Leaf(leaf) => leaf.len() as u64,
        }
    }

    /// Number of child or member slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        match self {
            Self::Branch(branch) => branch.children().len(),
            Self::Leaf(leaf) => leaf.len(),
        }
    }

    /// Smallest key in this subtree.
    #[must_use]
    pub fn leftmost_key(&self) -> &[u8] {
        match self {
            Self::Branch(branch) => branch.children()[0].leftmost_key(),
            Self::Leaf(leaf) => leaf.key(0),
        }
    }

    /// Insert or update `ctx.key` below `node`, cloning on the way down.
    pub fn create_or_update(node: &mut Arc<Self>, ctx: &mut CreateOrUpdateCtx<'_>) -> InsertOutcome {
        match writable(node, ctx.txn_id) {
            Self::Branch(branch) => branch.create_or_update(ctx),
            Self::Leaf(leaf) => leaf.create_or_update(ctx),
        }
    }

    /// Erase members `first..=last` (subtree-relative ordinals).
    pub fn erase_range(node: &mut Arc<Self>, txn_id: u64, first: u64, last: u64) -> EraseOutcome {
        if first == 0 && last + 1 >= node.key_count() {
            return EraseOutcome::Emptied;
        }
        match writable(node, txn_id) {
            Self::Branch(branch) => branch.erase_range(txn_id, first, last),
            Self::Leaf(leaf) => {
                leaf.erase_range(first as usize, last as usize);
                EraseOutcome::Kept
            }
        }
    }

    /// Erase the single member at `index`.
    pub fn erase_one(node: &mut Arc<Self>, txn_id: u64, index: u64) -> EraseOutcome {
        Self::erase_range(node, txn_id, index, index)
    }

    /// Descend towards `key`, pushing the path onto `stack`.
    pub fn find_key(node: &Arc<Self>, stack: &mut PathStack, key: &[u8]) -> NodeFind {
        let mut current = Arc::clone(node);
        loop {
            let next = match current.as_ref() {
                Self::Branch(branch) => {
                    let index = branch.find(key);
                    let child = Arc::clone(&branch.children()[index]);
                    stack.push(NodeIdxPair::new(Arc::clone(&current), index));
                    child
                }
                Self::Leaf(leaf) => {
                    let (index, found) = match leaf.find(key) {
                        Ok(index) => (index, NodeFind::Exact),
                        Err(0) => (0, NodeFind::Next),
                        Err(index) => (index - 1, NodeFind::Previous),
                    };
                    stack.push(NodeIdxPair::new(Arc::clone(&current), index));
                    return found;
                }
            };
            current = next;
        }
    }

    /// Descend to the key with subtree-relative ordinal `index`.
    pub fn fill_stack_by_index(node: &Arc<Self>, stack: &mut PathStack, mut index: u64) {
        let mut current = Arc::clone(node);
        loop {
            let (slot, child) = match current.as_ref() {
                Self::Branch(branch) => {
                    let child_index = branch.child_for_index(index);
                    index -= branch.count_before(child_index);
                    (child_index, Some(Arc::clone(&branch.children()[child_index])))
                }
                Self::Leaf(_) => (index as usize, None),
            };
            stack.push(NodeIdxPair::new(current, slot));
            match child {
                Some(child) => current = child,
                None => return,
            }
        }
    }

    /// Descend along first children to the smallest key.
    pub fn fill_stack_leftmost(node: &Arc<Self>, stack: &mut PathStack) {
        let mut current = Arc::clone(node);
        loop {
            let child = match current.as_ref() {
                Self::Branch(branch) => Some(Arc::clone(&branch.children()[0])),
                Self::Leaf(_) => None,
            };
            stack.push(NodeIdxPair::new(current, 0));
            match child {
                Some(child) => current = child,
                None => return,
            }
        }
    }

    /// Descend along last children to the largest key.
    pub fn fill_stack_rightmost(node: &Arc<Self>, stack: &mut PathStack) {
        let mut current = Arc::clone(node);
        loop {
            let last = current.slot_count() - 1;
            let child = match current.as_ref() {
                Self::Branch(branch) => Some(Arc::clone(&branch.children()[last])),
                Self::Leaf(_) => None,
            };
            stack.push(NodeIdxPair::new(current, last));
            match child {
                Some(child) => current = child,
                None => return,
            }
        }
    }

    /// Subtree-relative ordinal of the last key starting with `prefix`.
    #[must_use]
    pub fn find_last_with_prefix(&self, prefix: &[u8]) -> Option<u64> {
        match self {
            Self::Branch(branch) => {
                let child_index = branch.find_last_with_prefix(prefix);
                let within = branch.children()[child_index].find_last_with_prefix(prefix)?;
                Some(branch.count_before(child_index) + within)
            }
            Self::Leaf(leaf) => leaf.find_last_with_prefix(prefix).map(|i| i as u64),
        }
    }
}

/// Make `node` safe to mutate under `txn_id` and return it.
///
/// A node stamped by another transaction is replaced with a restamped clone.
/// A node already stamped `txn_id` is mutated in place unless a stale path
/// stack of the same transaction still holds it, in which case it is cloned.
pub fn writable(node: &mut Arc<Node>, txn_id: u64) -> &mut Node {
    if node.txn_id() != txn_id {
        let mut copy = Node::clone(node);
        copy.set_txn_id(txn_id);
        *node = Arc::new(copy);
    }
    Arc::make_mut(node)
}
