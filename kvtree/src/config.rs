//! Engine and simulation configuration.
//!
//! Configuration is loaded from environment variables, with defaults for
//! anything unset.
//!
//! # Environment Variables
//!
//! - `KVTREE_PACKED_KEY_LIMIT`: key-blob budget of a packed leaf (default: `65535`)
//! - `KVTREE_MAX_QUEUED_WRITERS`: bound on queued writers (default: unbounded)
//! - `KVTREE_SIM_SEED`: simulation seed (default: `0`)
//! - `KVTREE_SIM_OPERATIONS`: simulated operations (default: `10000`)
//! - `KVTREE_SIM_KEY_SPACE`: distinct keys the simulation draws from (default: `512`)
//!
//! # Invariants
//!
//! - `packed_key_limit` is always in `1..=65535`

use crate::storage::btree::MAX_PACKED_KEY_BYTES;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    packed_key_limit: usize,
    max_queued_writers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            packed_key_limit: MAX_PACKED_KEY_BYTES,
            max_queued_writers: None,
        }
    }
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse, or if
    /// `KVTREE_PACKED_KEY_LIMIT` is outside `1..=65535`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let packed_key_limit = load_number("KVTREE_PACKED_KEY_LIMIT")?.unwrap_or(MAX_PACKED_KEY_BYTES);
        let max_queued_writers = load_number("KVTREE_MAX_QUEUED_WRITERS")?;
        Self::default()
            .with_packed_key_limit(packed_key_limit)
            .map(|config| config.with_max_queued_writers(max_queued_writers))
    }

    /// Key bytes a packed leaf may hold before it is demoted to spread storage.
    #[must_use]
    pub const fn packed_key_limit(&self) -> usize {
        self.packed_key_limit
    }

    /// Maximum number of writers waiting for the write slot, if bounded.
    #[must_use]
    pub const fn max_queued_writers(&self) -> Option<usize> {
        self.max_queued_writers
    }

    /// Set the packed-leaf key budget.
    ///
    /// # Errors
    ///
    /// Returns an error if `limit` is zero or above 65535.
    pub fn with_packed_key_limit(mut self, limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 || limit > MAX_PACKED_KEY_BYTES {
            return Err(ConfigError::InvalidValue {
                name: "KVTREE_PACKED_KEY_LIMIT".to_string(),
                message: format!("{limit} is not in 1..={MAX_PACKED_KEY_BYTES}"),
            });
        }
        self.packed_key_limit = limit;
        Ok(self)
    }

    /// Bound (or unbound, with `None`) the writer queue.
    #[must_use]
    pub const fn with_max_queued_writers(mut self, max: Option<usize>) -> Self {
        self.max_queued_writers = max;
        self
    }
}

/// Settings for a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationSettings {
    pub seed: u64,
    pub operations: usize,
    pub key_space: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            operations: Self::DEFAULT_OPERATIONS,
            key_space: Self::DEFAULT_KEY_SPACE,
        }
    }
}

impl SimulationSettings {
    /// Default number of simulated operations.
    pub const DEFAULT_OPERATIONS: usize = 10_000;
    /// Default number of distinct keys.
    pub const DEFAULT_KEY_SPACE: u32 = 512;

    /// Load simulation settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse, or if the
    /// key space is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let key_space = load_number("KVTREE_SIM_KEY_SPACE")?.unwrap_or(defaults.key_space);
        if key_space == 0 {
            return Err(ConfigError::InvalidValue {
                name: "KVTREE_SIM_KEY_SPACE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            seed: load_number("KVTREE_SIM_SEED")?.unwrap_or(defaults.seed),
            operations: load_number("KVTREE_SIM_OPERATIONS")?.unwrap_or(defaults.operations),
            key_space,
        })
    }
}

/// Parse an optional numeric environment variable.
fn load_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a valid number"),
        }),
        Err(_) => Ok(None),
    }
}
