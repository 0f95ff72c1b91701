//! Structural validation of a tree version.
//!
//! Walks every node reachable from a root and checks the invariants the
//! algorithms rely on. Used by tests and the simulation; never on the hot
//! path.

use std::sync::Arc;

use crate::storage::btree::branch::MAX_CHILDREN_IN_BRANCH;
use crate::storage::btree::leaf::{LeafNode, MAX_MEMBERS_IN_LEAF, MAX_PACKED_KEY_BYTES};
use crate::storage::btree::node::Node;
use crate::storage::btree::tree::Root;

/// Shape of a valid tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub branches: usize,
    pub packed_leaves: usize,
    pub spread_leaves: usize,
    pub keys: u64,
}

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The root's key count disagrees with the keys actually reachable.
    KeyCount { recorded: u64, actual: u64 },
    /// Keys are not strictly increasing at this ordinal.
    Order { ordinal: u64 },
    /// A separator differs from the left-most key of the child to its right.
    Separator { depth: usize, child: usize },
    /// A cumulative count disagrees with the children's key counts.
    CumulativeCount { depth: usize, child: usize, recorded: u64, actual: u64 },
    /// A node has no slots, or more than its fan-out allows.
    Occupancy { depth: usize, slots: usize },
    /// A node carries a stamp newer than the root that reaches it.
    Stamp { depth: usize, stamp: u64, transaction_id: u64 },
    /// A packed leaf's blob does not match its member coordinates.
    PackedLayout { depth: usize },
    /// Leaves sit at different depths.
    Depth { expected: usize, actual: usize },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyCount { recorded, actual } => {
                write!(f, "root records {recorded} keys but {actual} are reachable")
            }
            Self::Order { ordinal } => write!(f, "key at ordinal {ordinal} is out of order"),
            Self::Separator { depth, child } => {
                write!(f, "separator before child {child} at depth {depth} is stale")
            }
            Self::CumulativeCount {
                depth,
                child,
                recorded,
                actual,
            } => write!(
                f,
                "cumulative count of child {child} at depth {depth} is {recorded}, expected {actual}"
            ),
            Self::Occupancy { depth, slots } => {
                write!(f, "node at depth {depth} has {slots} slots")
            }
            Self::Stamp {
                depth,
                stamp,
                transaction_id,
            } => write!(
                f,
                "node at depth {depth} stamped {stamp} is reachable from root {transaction_id}"
            ),
            Self::PackedLayout { depth } => {
                write!(f, "packed leaf at depth {depth} has a corrupt key blob")
            }
            Self::Depth { expected, actual } => {
                write!(f, "leaf at depth {actual}, expected {expected}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

struct Walker<'a> {
    root: &'a Root,
    stats: TreeStats,
    leaf_depth: Option<usize>,
    previous_key: Option<Vec<u8>>,
    ordinal: u64,
}

/// Check every structural invariant of `root`.
pub fn validate_tree(root: &Root) -> Result<TreeStats, InvariantViolation> {
    let mut walker = Walker {
        root,
        stats: TreeStats::default(),
        leaf_depth: None,
        previous_key: None,
        ordinal: 0,
    };
    if let Some(top) = root.top() {
        walker.visit(top, 1)?;
    }
    if walker.ordinal != root.key_count() {
        return Err(InvariantViolation::KeyCount {
            recorded: root.key_count(),
            actual: walker.ordinal,
        });
    }
    walker.stats.height = walker.leaf_depth.unwrap_or(0);
    walker.stats.keys = walker.ordinal;
    Ok(walker.stats)
}

impl Walker<'_> {
    fn visit(&mut self, node: &Arc<Node>, depth: usize) -> Result<(), InvariantViolation> {
        if node.txn_id() > self.root.transaction_id() {
            return Err(InvariantViolation::Stamp {
                depth,
                stamp: node.txn_id(),
                transaction_id: self.root.transaction_id(),
            });
        }
        match node.as_ref() {
            Node::Branch(branch) => {
                let slots = branch.children().len();
                if slots == 0 || slots > MAX_CHILDREN_IN_BRANCH {
                    return Err(InvariantViolation::Occupancy { depth, slots });
                }
                self.stats.branches += 1;
                let mut total = 0;
                for (index, child) in branch.children().iter().enumerate() {
                    if index > 0 && branch.keys()[index - 1].as_ref() != child.leftmost_key() {
                        return Err(InvariantViolation::Separator {
                            depth,
                            child: index,
                        });
                    }
                    self.visit(child, depth + 1)?;
                    total += child.key_count();
                    if branch.counts()[index] != total {
                        return Err(InvariantViolation::CumulativeCount {
                            depth,
                            child: index,
                            recorded: branch.counts()[index],
                            actual: total,
                        });
                    }
                }
                Ok(())
            }
            Node::Leaf(leaf) => self.visit_leaf(leaf, depth),
        }
    }

    fn visit_leaf(&mut self, leaf: &LeafNode, depth: usize) -> Result<(), InvariantViolation> {
        match self.leaf_depth {
            Some(expected) if expected != depth => {
                return Err(InvariantViolation::Depth {
                    expected,
                    actual: depth,
                });
            }
            _ => self.leaf_depth = Some(depth),
        }
        if leaf.is_empty() || leaf.len() > MAX_MEMBERS_IN_LEAF {
            return Err(InvariantViolation::Occupancy {
                depth,
                slots: leaf.len(),
            });
        }
        if let Some((blob, layout)) = leaf.packed_layout() {
            self.stats.packed_leaves += 1;
            let mut expected_offset = 0;
            for &(offset, len) in &layout {
                if offset != expected_offset {
                    return Err(InvariantViolation::PackedLayout { depth });
                }
                expected_offset += len;
            }
            if expected_offset != blob.len() || blob.len() > MAX_PACKED_KEY_BYTES {
                return Err(InvariantViolation::PackedLayout { depth });
            }
        } else {
            self.stats.spread_leaves += 1;
        }
        for index in 0..leaf.len() {
            let key = leaf.key(index);
            if self
                .previous_key
                .as_deref()
                .is_some_and(|previous| previous >= key)
            {
                return Err(InvariantViolation::Order {
                    ordinal: self.ordinal,
                });
            }
            self.previous_key = Some(key.to_vec());
            self.ordinal += 1;
        }
        Ok(())
    }
}
