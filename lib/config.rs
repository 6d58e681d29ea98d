//! Bridge configuration.
//!
//! Configuration may be constructed programmatically or loaded from a TOML
//! file. Every knob except the virtualization root has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_cache_budget() -> ByteSize {
    ByteSize::mib(64)
}

fn default_entry_ttl_ms() -> u64 {
    5_000
}

fn default_wait_bound_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// Log verbosity for the bridge's tracing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogVerbosity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogVerbosity {
    /// The tracing filter directive for this verbosity.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Cache sizing and staleness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Maximum total bytes of cached metadata, listings, and content.
    #[serde(default = "default_cache_budget")]
    pub max_size: ByteSize,

    /// Entry time-to-live in milliseconds.
    #[serde(default = "default_entry_ttl_ms")]
    pub entry_ttl_ms: u64,
}

impl CacheConfig {
    #[must_use]
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_millis(self.entry_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_budget(),
            entry_ttl_ms: default_entry_ttl_ms(),
        }
    }
}

/// Directory enumeration coordination configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnumerationConfig {
    /// Upper bound in milliseconds on how long a follower waits for an
    /// in-flight enumeration of the same path before reading on its own.
    #[serde(default = "default_wait_bound_ms")]
    pub wait_bound_ms: u64,

    /// Pre-populate the root and its top-level directories at mount start.
    #[serde(default = "default_true")]
    pub warm_start: bool,
}

impl EnumerationConfig {
    #[must_use]
    pub fn wait_bound(&self) -> Duration {
        Duration::from_millis(self.wait_bound_ms)
    }
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            wait_bound_ms: default_wait_bound_ms(),
            warm_start: true,
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeConfig {
    /// Host directory the store is projected into.
    pub virtualization_root: PathBuf,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub enumeration: EnumerationConfig,

    #[serde(default)]
    pub log_verbosity: LogVerbosity,

    /// Fold names case-insensitively when detecting duplicate directory
    /// entries, matching host explorer semantics. Stored names stay
    /// case-preserved either way.
    #[serde(default = "default_true")]
    pub case_insensitive_names: bool,
}

impl BridgeConfig {
    /// A configuration with defaults for everything but the root.
    #[must_use]
    pub fn new(virtualization_root: impl Into<PathBuf>) -> Self {
        Self {
            virtualization_root: virtualization_root.into(),
            cache: CacheConfig::default(),
            enumeration: EnumerationConfig::default(),
            log_verbosity: LogVerbosity::default(),
            case_insensitive_names: true,
        }
    }

    /// Validate the correctness of the configuration.
    ///
    /// Returns a list of validation error messages if invalid.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.virtualization_root.as_os_str().is_empty() {
            errors.push("virtualization root must not be empty".to_owned());
        }
        if self.cache.entry_ttl_ms == 0 {
            errors.push("cache entry TTL must be non-zero".to_owned());
        }
        if self.cache.max_size.as_u64() == 0 {
            errors.push("cache byte budget must be non-zero".to_owned());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        if let Err(validation_errors) = config.validate() {
            return Err(ConfigError::ValidationErrors(validation_errors));
        }
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
