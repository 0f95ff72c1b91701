//! End-to-end tests through the public engine API.
//!
//! Each test file covers a specific scenario, using deterministic inputs
//! to check a property of the engine as a whole.

#![cfg(test)]

mod helpers;

mod test_concrete_scenario;
mod test_conflict_retry;
mod test_count_invariant;
mod test_cow_sharing;
mod test_cursor_shift;
mod test_leaf_demotion;
mod test_order_invariant;
mod test_ordinal_round_trip;
mod test_snapshot_isolation;
mod test_split_correctness;
mod test_writer_queue;
