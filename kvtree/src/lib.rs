//! In-memory, copy-on-write, multi-version B-tree key-value engine.
//!
//! - [`storage`]: the tree, the transaction manager, transactions and cursors
//! - [`config`]: engine and simulation settings loaded from the environment
//! - [`simulation`]: seeded workload simulation against a model
//!
//! Life of a write:
//! 1. A writer obtains the write slot (immediately, or FIFO after queueing)
//! 2. Its root starts as a copy of the last committed root; nodes are cloned
//!    only when a mutation first reaches them
//! 3. Commit publishes the new root; readers that started earlier keep the
//!    root they captured

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod simulation;
pub mod storage;

#[cfg(test)]
mod e2e_tests;
