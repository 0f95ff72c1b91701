//! Path stacks.
//!
//! Nodes carry no parent pointers. Every traversal instead records the route
//! it took as `(node, slot)` pairs from the top node down to a leaf member,
//! and successor/predecessor moves rewrite the lower part of that route.

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use crate::storage::btree::node::Node;

/// One step of a path: a node and the child (branch) or member (leaf) slot
/// taken in it.
#[derive(Debug, Clone)]
pub struct NodeIdxPair {
    pub node: Arc<Node>,
    pub idx: usize,
}

impl NodeIdxPair {
    #[must_use]
    pub const fn new(node: Arc<Node>, idx: usize) -> Self {
        Self { node, idx }
    }
}

/// Route from the top node to a leaf member.
pub type PathStack = Vec<NodeIdxPair>;

/// Ordinal of the member a complete path points at.
#[must_use]
pub fn calc_index(stack: &[NodeIdxPair]) -> u64 {
    stack
        .iter()
        .map(|pair| match pair.node.as_ref() {
            Node::Branch(branch) => branch.count_before(pair.idx),
            Node::Leaf(_) => pair.idx as u64,
        })
        .sum()
}

/// Move a complete path to the next key. Returns false, leaving the path
/// untouched, when it already points at the last key.
pub fn move_next(stack: &mut PathStack) -> bool {
    let Some(level) = stack
        .iter()
        .rposition(|pair| pair.idx + 1 < pair.node.slot_count())
    else {
        return false;
    };
    stack.truncate(level + 1);
    stack[level].idx += 1;
    descend_below(stack, level, Node::fill_stack_leftmost);
    true
}

/// Move a complete path to the previous key. Returns false, leaving the path
/// untouched, when it already points at the first key.
pub fn move_previous(stack: &mut PathStack) -> bool {
    let Some(level) = stack.iter().rposition(|pair| pair.idx > 0) else {
        return false;
    };
    stack.truncate(level + 1);
    stack[level].idx -= 1;
    descend_below(stack, level, Node::fill_stack_rightmost);
    true
}

/// Rebuild the path below `level` with `fill`, starting from the child the
/// pair at `level` now points at.
fn descend_below(stack: &mut PathStack, level: usize, fill: fn(&Arc<Node>, &mut PathStack)) {
    let pair = &stack[level];
    let child = match pair.node.as_ref() {
        Node::Branch(branch) => Arc::clone(&branch.children()[pair.idx]),
        Node::Leaf(_) => return,
    };
    fill(&child, stack);
}

/// Key the path points at.
#[must_use]
pub fn current_key(stack: &[NodeIdxPair]) -> Option<&[u8]> {
    let pair = stack.last()?;
    match pair.node.as_ref() {
        Node::Leaf(leaf) => Some(leaf.key(pair.idx)),
        Node::Branch(_) => None,
    }
}

/// Value the path points at.
#[must_use]
pub fn current_value(stack: &[NodeIdxPair]) -> Option<&Arc<[u8]>> {
    let pair = stack.last()?;
    match pair.node.as_ref() {
        Node::Leaf(leaf) => Some(leaf.value(pair.idx)),
        Node::Branch(_) => None,
    }
}
