//! Main simulator harness for deterministic simulation testing.
//!
//! Applies a generated workload to a [`KeyValueDb`] and to a `BTreeMap`
//! model side by side, checking the engine against the model as it goes.

use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::storage::{
    Cursor, CursorError, FindResult, KeyValueDb, Transaction, TransactionError, UpsertResult,
};

use super::generator::{Operation, OperationGenConfig, OperationGenerator};
use super::invariants::{InvariantChecker, InvariantViolation, Model, Snapshot};

/// Most snapshots pinned at once; capturing another releases the oldest.
const MAX_SNAPSHOTS: usize = 4;

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Operation generation configuration.
    pub operation_config: OperationGenConfig,
    /// Engine configuration.
    pub engine_config: EngineConfig,
}

impl SimulatorConfig {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            operation_config: OperationGenConfig::default(),
            engine_config: EngineConfig::default(),
        }
    }

    /// Set the number of distinct keys.
    #[must_use]
    pub const fn with_key_space(mut self, key_space: u32) -> Self {
        self.operation_config.key_space = key_space;
        self
    }

    #[must_use]
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of operations processed.
    pub operations_processed: u64,
    /// Number of committed write transactions.
    pub commits: u64,
    /// Number of aborted write transactions.
    pub aborts: u64,
    /// Keys in the last committed version.
    pub final_key_count: u64,
    /// Fingerprint of the last committed version.
    pub final_fingerprint: u32,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether the simulation ran to the end.
    pub completed_successfully: bool,
    /// Error message if simulation failed.
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully && self.invariant_violations.is_empty()
    }
}

struct Writer {
    txn: Transaction,
    pending: Model,
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    generator: OperationGenerator,
    checker: InvariantChecker,
    committed: Model,
    snapshots: VecDeque<Snapshot>,
    operations_processed: u64,
    commits: u64,
    aborts: u64,
}

impl Simulator {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let generator = OperationGenerator::with_config(config.seed, config.operation_config.clone());
        Self {
            config,
            generator,
            checker: InvariantChecker::new(),
            committed: Model::new(),
            snapshots: VecDeque::new(),
            operations_processed: 0,
            commits: 0,
            aborts: 0,
        }
    }

    /// Run `operation_count` operations against a fresh store, then commit
    /// whatever is pending and check the final state.
    pub fn run(&mut self, operation_count: usize) -> SimulationResult {
        let db = KeyValueDb::with_config(self.config.engine_config.clone());
        let error = self.run_with_db(&db, operation_count).err();
        let final_state = db
            .start_read_only_transaction()
            .and_then(|txn| Ok((txn.key_value_count()?, txn.fingerprint()?)));
        self.result(final_state, error)
    }

    fn run_with_db(&mut self, db: &KeyValueDb, operation_count: usize) -> Result<(), String> {
        let mut writer: Option<Writer> = None;
        for index in 0..operation_count {
            let operation = self.generator.next_operation();
            self.operations_processed += 1;

            if operation.is_mutation() && writer.is_none() {
                let txn = futures::executor::block_on(db.start_writing_transaction())
                    .map_err(|e| format!("operation {index}: writer not granted: {e}"))?;
                writer = Some(Writer {
                    txn,
                    pending: self.committed.clone(),
                });
            }

            match operation {
                Operation::Commit => {
                    if let Some(writer) = writer.take() {
                        self.commit(db, writer, index)?;
                    }
                }
                Operation::Abort => {
                    if let Some(writer) = writer.take() {
                        writer.txn.abort();
                        self.aborts += 1;
                        self.check_committed(db, index)?;
                    }
                }
                Operation::CaptureSnapshot => self.capture_snapshot(db, index)?,
                Operation::ReleaseSnapshot => {
                    self.snapshots.pop_front();
                }
                mutation => {
                    if let Some(writer) = writer.as_mut() {
                        self.apply(writer, &mutation, index)
                            .map_err(|e| format!("operation {index} ({mutation:?}): {e}"))?;
                    }
                }
            }
        }

        if let Some(writer) = writer.take() {
            self.commit(db, writer, operation_count)?;
        }
        Ok(())
    }

    fn apply(&mut self, writer: &mut Writer, operation: &Operation, index: usize) -> Result<(), CursorError> {
        let mut cursor = writer.txn.create_cursor();
        match operation {
            Operation::Upsert { key, value } => {
                let expected = if writer.pending.contains_key(key) {
                    UpsertResult::Updated
                } else {
                    UpsertResult::Created
                };
                let result = cursor.upsert(key, value)?;
                if result != expected {
                    self.checker.violation(
                        index,
                        "upsert outcome differs from model",
                        format!("engine {result:?}, model {expected:?}"),
                    );
                }
                if cursor.key()? != *key {
                    self.checker
                        .violation(index, "cursor not on upserted key", String::new());
                }
                writer.pending.insert(key.clone(), value.clone());
            }
            Operation::CreateKey { key, value } => {
                let created = cursor.create_key(key, value)?;
                if created == writer.pending.contains_key(key) {
                    self.checker.violation(
                        index,
                        "create_key outcome differs from model",
                        format!("engine created {created}"),
                    );
                }
                writer.pending.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Operation::Erase { key } => {
                let found = cursor.find_exact(key)?;
                if found != writer.pending.contains_key(key) {
                    self.checker.violation(
                        index,
                        "find_exact differs from model",
                        format!("engine found {found}"),
                    );
                }
                if found {
                    cursor.erase_current()?;
                    writer.pending.remove(key);
                }
            }
            Operation::EraseRange { from, to } => {
                let erased = erase_between(&writer.txn, &mut cursor, from, to)?;
                let expected = if from <= to {
                    let doomed: Vec<Vec<u8>> = writer
                        .pending
                        .range(from.clone()..=to.clone())
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in &doomed {
                        writer.pending.remove(key);
                    }
                    doomed.len() as u64
                } else {
                    0
                };
                if erased != expected {
                    self.checker.violation(
                        index,
                        "range erase count differs from model",
                        format!("engine {erased}, model {expected}"),
                    );
                }
            }
            Operation::ErasePrefix { prefix } => {
                let counted = cursor.key_value_count(prefix)?;
                let erased = cursor.erase_all(prefix)?;
                let before = writer.pending.len();
                writer.pending.retain(|key, _| !key.starts_with(prefix));
                let expected = (before - writer.pending.len()) as u64;
                if counted != expected || erased != expected {
                    self.checker.violation(
                        index,
                        "prefix erase count differs from model",
                        format!("counted {counted}, erased {erased}, model {expected}"),
                    );
                }
            }
            Operation::Commit
            | Operation::Abort
            | Operation::CaptureSnapshot
            | Operation::ReleaseSnapshot => {}
        }
        Ok(())
    }

    fn commit(&mut self, db: &KeyValueDb, writer: Writer, index: usize) -> Result<(), String> {
        self.checker.check_structure(&writer.txn, index);
        self.checker.check_contents(&writer.txn, &writer.pending, index);
        writer
            .txn
            .commit()
            .map_err(|e| format!("operation {index}: commit failed: {e}"))?;
        self.committed = writer.pending;
        self.commits += 1;
        self.check_committed(db, index)?;
        for snapshot in &self.snapshots {
            self.checker.check_snapshot(snapshot, index);
        }
        Ok(())
    }

    fn check_committed(&mut self, db: &KeyValueDb, index: usize) -> Result<(), String> {
        let reader = db
            .start_read_only_transaction()
            .map_err(|e| format!("operation {index}: reader not started: {e}"))?;
        self.checker.check_contents(&reader, &self.committed, index);
        Ok(())
    }

    fn capture_snapshot(&mut self, db: &KeyValueDb, index: usize) -> Result<(), String> {
        let txn = db
            .start_read_only_transaction()
            .map_err(|e| format!("operation {index}: reader not started: {e}"))?;
        let fingerprint = txn
            .fingerprint()
            .map_err(|e| format!("operation {index}: fingerprint failed: {e}"))?;
        if self.snapshots.len() == MAX_SNAPSHOTS {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(Snapshot {
            txn,
            expected: self.committed.clone(),
            fingerprint,
            taken_at: index,
        });
        Ok(())
    }

    /// Summarize the run. An unreadable final version is a violation.
    fn result(
        &mut self,
        final_state: Result<(u64, u32), TransactionError>,
        error: Option<String>,
    ) -> SimulationResult {
        let (final_key_count, final_fingerprint) = final_state.unwrap_or_else(|e| {
            self.checker.violation(
                usize::try_from(self.operations_processed).unwrap_or(usize::MAX),
                "final state unreadable",
                e.to_string(),
            );
            (0, 0)
        });
        SimulationResult {
            seed: self.config.seed,
            operations_processed: self.operations_processed,
            commits: self.commits,
            aborts: self.aborts,
            final_key_count,
            final_fingerprint,
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully: error.is_none(),
            error,
        }
    }
}

/// Erase every key in `from..=to` with two cursors and one range erase.
fn erase_between(
    txn: &Transaction,
    first: &mut Cursor,
    from: &[u8],
    to: &[u8],
) -> Result<u64, CursorError> {
    let found_first = match first.find(from, 0)? {
        FindResult::Exact | FindResult::Next => true,
        FindResult::Previous => first.find_next(&[])?,
        FindResult::NotFound => false,
    };
    if !found_first {
        return Ok(0);
    }
    let mut last = txn.create_cursor();
    let found_last = match last.find(to, 0)? {
        FindResult::Exact | FindResult::Previous => true,
        FindResult::Next => last.find_previous(&[])?,
        FindResult::NotFound => false,
    };
    if !found_last {
        return Ok(0);
    }
    first.erase_up_to(&last)
}
