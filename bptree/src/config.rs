//! Index configuration.
//!
//! Loads where the index file lives and how writes are flushed from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `BPTREE_PATH`: Path of the index file (default: `bplustree.dat`)
//! - `BPTREE_SYNC_WRITES`: Sync data to disk after every write; one of
//!   `true`, `false`, `1`, `0` (default: `false`)

use std::path::PathBuf;

/// Index configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Path of the index file. Created on first open if missing.
    pub path: PathBuf,
    /// Whether every record and header write is followed by a data sync.
    pub sync_writes: bool,
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

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(Self::DEFAULT_PATH),
            sync_writes: false,
        }
    }
}

impl TreeConfig {
    /// Default index file path.
    pub const DEFAULT_PATH: &'static str = "bplustree.dat";

    const PATH_VAR: &'static str = "BPTREE_PATH";
    const SYNC_WRITES_VAR: &'static str = "BPTREE_SYNC_WRITES";

    /// Configuration for the index file at `path`, without write syncing.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `BPTREE_PATH` is set but empty, or if
    /// `BPTREE_SYNC_WRITES` is set to something other than a boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = Self::load_path(lookup(Self::PATH_VAR))?;
        let sync_writes = Self::load_sync_writes(lookup(Self::SYNC_WRITES_VAR))?;

        Ok(Self { path, sync_writes })
    }

    /// Returns the default if not set.
    fn load_path(value: Option<String>) -> Result<PathBuf, ConfigError> {
        match value {
            Some(value) if value.is_empty() => Err(ConfigError::InvalidValue {
                name: Self::PATH_VAR.to_string(),
                message: "must not be empty".to_string(),
            }),
            Some(value) => Ok(PathBuf::from(value)),
            None => Ok(PathBuf::from(Self::DEFAULT_PATH)),
        }
    }

    /// Returns `false` if not set.
    fn load_sync_writes(value: Option<String>) -> Result<bool, ConfigError> {
        let Some(value) = value else {
            return Ok(false);
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: Self::SYNC_WRITES_VAR.to_string(),
                message: format!("'{value}' is not a boolean (expected true, false, 1 or 0)"),
            }),
        }
    }
}
