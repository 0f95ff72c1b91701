//! Operation generator for deterministic simulation testing.
//!
//! Produces random but reproducible workloads over a bounded key space so
//! that inserts, updates and erases keep colliding with each other.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of leading-byte groups keys are spread over; prefix erases target
/// one group (or a narrower prefix inside it).
pub const KEY_GROUPS: u32 = 8;

/// Configuration for operation generation.
#[derive(Debug, Clone)]
pub struct OperationGenConfig {
    /// Number of distinct keys to draw from.
    pub key_space: u32,
    /// Maximum value length in bytes.
    pub max_value_len: usize,
    /// Percent of operations that end the current write transaction.
    pub transaction_end_rate: u32,
    /// Percent of operations that capture or release a reader snapshot.
    pub snapshot_rate: u32,
}

impl Default for OperationGenConfig {
    fn default() -> Self {
        Self {
            key_space: 512,
            max_value_len: 24,
            transaction_end_rate: 4,
            snapshot_rate: 2,
        }
    }
}

/// One simulated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Insert or overwrite a key.
    Upsert { key: Vec<u8>, value: Vec<u8> },
    /// Insert a key only if absent.
    CreateKey { key: Vec<u8>, value: Vec<u8> },
    /// Erase a single key, if present.
    Erase { key: Vec<u8> },
    /// Erase every key in `from..=to`.
    EraseRange { from: Vec<u8>, to: Vec<u8> },
    /// Erase every key starting with `prefix`.
    ErasePrefix { prefix: Vec<u8> },
    /// Commit the current write transaction.
    Commit,
    /// Abort the current write transaction.
    Abort,
    /// Pin the last committed version in a read-only transaction.
    CaptureSnapshot,
    /// Drop the oldest pinned snapshot.
    ReleaseSnapshot,
}

impl Operation {
    /// Whether the operation needs a write transaction.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Upsert { .. }
                | Self::CreateKey { .. }
                | Self::Erase { .. }
                | Self::EraseRange { .. }
                | Self::ErasePrefix { .. }
        )
    }
}

/// Key for `id`: a group byte, the big-endian id, and `id % 5` bytes of
/// padding so key lengths vary.
#[must_use]
pub fn key_for(id: u32) -> Vec<u8> {
    let group = u8::try_from(id % KEY_GROUPS).unwrap_or_default();
    let padding = usize::try_from(id % 5).unwrap_or_default();
    let mut key = Vec::with_capacity(5 + padding);
    key.push(group);
    key.extend_from_slice(&id.to_be_bytes());
    key.extend(std::iter::repeat_n(b'.', padding));
    key
}

/// Generator for random [`Operation`] sequences.
///
/// Given the same seed and configuration, the sequence is identical.
pub struct OperationGenerator {
    rng: StdRng,
    config: OperationGenConfig,
}

impl OperationGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, OperationGenConfig::default())
    }

    #[must_use]
    pub fn with_config(seed: u64, config: OperationGenConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Generate the next operation.
    pub fn next_operation(&mut self) -> Operation {
        let roll = self.rng.random_range(0..100);
        let ends = self.config.transaction_end_rate;
        let snapshots = self.config.snapshot_rate;

        if roll < ends {
            return if self.rng.random_bool(0.8) {
                Operation::Commit
            } else {
                Operation::Abort
            };
        }
        if roll < ends + snapshots {
            return if self.rng.random_bool(0.6) {
                Operation::CaptureSnapshot
            } else {
                Operation::ReleaseSnapshot
            };
        }

        match self.rng.random_range(0..100) {
            0..55 => Operation::Upsert {
                key: self.random_key(),
                value: self.random_value(),
            },
            55..70 => Operation::CreateKey {
                key: self.random_key(),
                value: self.random_value(),
            },
            70..92 => Operation::Erase {
                key: self.random_key(),
            },
            92..98 => {
                let from = self.random_id();
                let span = self.rng.random_range(0..self.config.key_space.clamp(1, 64));
                Operation::EraseRange {
                    from: key_for(from),
                    to: key_for(from.saturating_add(span)),
                }
            }
            _ => {
                let key = self.random_key();
                let len = self.rng.random_range(1..=3);
                Operation::ErasePrefix {
                    prefix: key[..len].to_vec(),
                }
            }
        }
    }

    fn random_id(&mut self) -> u32 {
        self.rng.random_range(0..self.config.key_space.max(1))
    }

    fn random_key(&mut self) -> Vec<u8> {
        let id = self.random_id();
        key_for(id)
    }

    fn random_value(&mut self) -> Vec<u8> {
        let len = self.rng.random_range(0..=self.config.max_value_len);
        let mut value = vec![0u8; len];
        self.rng.fill(&mut value[..]);
        value
    }
}
