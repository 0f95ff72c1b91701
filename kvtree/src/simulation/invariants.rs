//! Invariant checking for deterministic simulation testing.
//!
//! The engine is checked against a plain `BTreeMap` model: contents, counts,
//! ordinals, tree structure, and the immutability of pinned snapshots.

use std::collections::BTreeMap;

use crate::storage::btree::validate_tree;
use crate::storage::{CursorError, Transaction};

/// Expected contents of one version.
pub type Model = BTreeMap<Vec<u8>, Vec<u8>>;

/// Check every `ORDINAL_SAMPLE_STRIDE`-th ordinal for a round trip.
const ORDINAL_SAMPLE_STRIDE: usize = 13;

/// An invariant violation detected during simulation.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Operation index where it was detected.
    pub operation_index: usize,
    /// Additional context.
    pub context: String,
}

/// A read-only transaction pinned at some point of the run, with what it
/// must keep seeing.
pub struct Snapshot {
    pub txn: Transaction,
    pub expected: Model,
    pub fingerprint: u32,
    pub taken_at: usize,
}

/// Checker for engine invariants.
#[derive(Default)]
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
}

impl InvariantChecker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn add_violation(&mut self, violation: InvariantViolation) {
        self.violations.push(violation);
    }

    /// Record a violation from its parts.
    pub fn violation(
        &mut self,
        operation_index: usize,
        description: impl Into<String>,
        context: impl Into<String>,
    ) {
        self.add_violation(InvariantViolation {
            description: description.into(),
            operation_index,
            context: context.into(),
        });
    }

    /// Check that `txn` sees exactly `expected`, in order, with matching
    /// counts and ordinals.
    pub fn check_contents(&mut self, txn: &Transaction, expected: &Model, operation_index: usize) {
        match txn.key_value_count() {
            Ok(count) if count == expected.len() as u64 => {}
            Ok(count) => self.violation(
                operation_index,
                "key count differs from model",
                format!("engine {count}, model {}", expected.len()),
            ),
            Err(e) => self.violation(operation_index, "key count failed", e.to_string()),
        }

        let actual = match collect_contents(txn) {
            Ok(actual) => actual,
            Err(e) => {
                self.violation(operation_index, "iteration failed", e.to_string());
                return;
            }
        };
        if let Some(position) = actual
            .iter()
            .zip(expected.iter())
            .position(|((key, value), (model_key, model_value))| {
                key != model_key || value != model_value
            })
        {
            self.violation(
                operation_index,
                "contents differ from model",
                format!("first difference at ordinal {position}"),
            );
            return;
        }
        if actual.len() != expected.len() {
            self.violation(
                operation_index,
                "iteration length differs from model",
                format!("engine {}, model {}", actual.len(), expected.len()),
            );
            return;
        }

        if let Err(e) = check_ordinals(txn, expected) {
            self.violation(operation_index, "ordinal round trip failed", e);
        }
    }

    /// Check the structural invariants of the version `txn` sees.
    pub fn check_structure(&mut self, txn: &Transaction, operation_index: usize) {
        match txn.inspect(validate_tree) {
            Ok(Ok(_)) => {}
            Ok(Err(violation)) => {
                self.violation(operation_index, "tree structure invalid", violation.to_string());
            }
            Err(e) => self.violation(operation_index, "inspect failed", e.to_string()),
        }
    }

    /// Check that a pinned snapshot still sees what it saw when taken.
    pub fn check_snapshot(&mut self, snapshot: &Snapshot, operation_index: usize) {
        match snapshot.txn.fingerprint() {
            Ok(fingerprint) if fingerprint == snapshot.fingerprint => {}
            Ok(fingerprint) => {
                self.violation(
                    operation_index,
                    "snapshot fingerprint changed",
                    format!(
                        "taken at {} with {:08x}, now {fingerprint:08x}",
                        snapshot.taken_at, snapshot.fingerprint
                    ),
                );
                return;
            }
            Err(e) => {
                self.violation(operation_index, "snapshot fingerprint failed", e.to_string());
                return;
            }
        }
        self.check_contents(&snapshot.txn, &snapshot.expected, operation_index);
    }
}

/// Every key/value `txn` sees, in order.
pub fn collect_contents(txn: &Transaction) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CursorError> {
    let mut cursor = txn.create_cursor();
    let mut contents = Vec::new();
    cursor.fast_iterate(&[], |key, value| {
        contents.push((key.to_vec(), value.to_vec()));
        true
    })?;
    Ok(contents)
}

fn check_ordinals(txn: &Transaction, expected: &Model) -> Result<(), String> {
    let mut cursor = txn.create_cursor();
    for (ordinal, key) in expected.keys().enumerate().step_by(ORDINAL_SAMPLE_STRIDE) {
        let ordinal = ordinal as u64;
        if !cursor.find_key_index(ordinal).map_err(|e| e.to_string())? {
            return Err(format!("ordinal {ordinal} not found"));
        }
        if cursor.calc_index().map_err(|e| e.to_string())? != ordinal {
            return Err(format!("ordinal {ordinal} reported a different index"));
        }
        if cursor.key().map_err(|e| e.to_string())? != *key {
            return Err(format!("ordinal {ordinal} holds the wrong key"));
        }
    }
    Ok(())
}
