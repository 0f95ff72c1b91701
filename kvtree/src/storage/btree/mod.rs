//! Copy-on-write, multi-version B-tree.
//!
//! This module provides the in-memory tree behind the key-value engine.
//!
//! # Structure
//!
//! The B-tree consists of:
//! - Branch nodes: up to 30 children, one separator per gap, and cumulative
//!   key counts for ordinal (rank) queries
//! - Leaf nodes: up to 30 sorted key-value members, either packed (one key
//!   blob per leaf) or spread (one allocation per key)
//! - Roots: one per version, stamped with a transaction id
//!
//! Nodes have no parent or sibling pointers. Traversals record their route in
//! a [`PathStack`] instead, and a writer clones every node on its path whose
//! stamp differs from its own transaction id, so older roots keep seeing the
//! nodes they were committed with.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use kvtree::storage::btree::{CreateOrUpdateCtx, MAX_PACKED_KEY_BYTES, Root, UpsertResult};
//!
//! let committed = Root::new();
//! let mut writer = committed.new_transaction_root();
//! let mut ctx = CreateOrUpdateCtx::new(b"key", Arc::from(&b"value"[..]), writer.transaction_id(), MAX_PACKED_KEY_BYTES);
//! assert_eq!(writer.create_or_update(&mut ctx), UpsertResult::Created);
//! assert_eq!(writer.key_count(), 1);
//! assert_eq!(committed.key_count(), 0);
//! ```

mod branch;
mod leaf;
mod node;
pub mod stack;
mod tree;
mod validate;

pub use branch::{BranchNode, MAX_CHILDREN_IN_BRANCH};
pub use leaf::{LeafNode, MAX_MEMBERS_IN_LEAF, MAX_PACKED_KEY_BYTES, compare_truncated};
pub use node::{CreateOrUpdateCtx, EraseOutcome, InsertOutcome, Node, NodeFind};
pub use stack::{NodeIdxPair, PathStack};
pub use tree::{FindResult, Root, ULONG_SLOTS, UpsertResult};
pub use validate::{InvariantViolation, TreeStats, validate_tree};
