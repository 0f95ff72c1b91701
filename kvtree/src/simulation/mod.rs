//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module drives the engine with seeded random workloads and checks it
//! against a simple ordered-map model after every transaction:
//! - Reproducible operation generation (upserts, erases, range and prefix
//!   erases, commits, aborts, snapshot captures)
//! - Content, count and ordinal checks against the model
//! - Structural validation of every committed tree
//! - Snapshot isolation: pinned readers must keep their fingerprint
//!
//! Given the same seed and configuration, a run is identical.
//!
//! # Usage
//!
//! ```
//! use kvtree::simulation::{Simulator, SimulatorConfig};
//!
//! let mut sim = Simulator::new(SimulatorConfig::new(12345).with_key_space(64));
//! let result = sim.run(500);
//!
//! assert!(result.passed(), "{:?}", result.invariant_violations);
//! ```

mod generator;
mod invariants;
mod simulator;

pub use generator::{KEY_GROUPS, Operation, OperationGenConfig, OperationGenerator, key_for};
pub use invariants::{InvariantChecker, InvariantViolation, Model, Snapshot, collect_contents};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
