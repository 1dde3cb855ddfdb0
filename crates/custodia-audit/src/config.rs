//! TOML configuration for the audit log.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```toml
//! [store]
//! path = "custodia.db"
//!
//! [append]
//! max_retries = 5
//!
//! [verify]
//! default_limit = 1000
//!
//! [retention]
//! years = 6
//! ```
//!
//! `retention.years` is carried for operational tooling; retention itself
//! is an external operation that must anchor a verified checkpoint for the
//! retained suffix before pruning anything. This subsystem never deletes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use custodia_contracts::error::{CustodiaError, CustodiaResult};

use crate::logger::DEFAULT_RETRY_BUDGET;

/// Top-level audit configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub store: StoreConfig,
    pub append: AppendConfig,
    pub verify: VerifyConfig,
    pub retention: RetentionConfig,
}

/// Where the durable store lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Append protocol tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendConfig {
    /// Retries after a lost tip race before surfacing a conflict.
    pub max_retries: u32,
}

/// Verifier defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Entries examined per verification pass when the caller gives no limit.
    pub default_limit: u64,
}

/// Retention policy, for operational tooling only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How many years of entries must be retained.
    pub years: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("custodia.db"),
        }
    }
}

impl Default for AppendConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            default_limit: 1000,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { years: 6 }
    }
}

impl AuditConfig {
    /// Parse `s` as a TOML audit configuration.
    ///
    /// Returns `CustodiaError::Config` if the TOML is malformed or does not
    /// match the expected schema.
    pub fn from_toml_str(s: &str) -> CustodiaResult<Self> {
        toml::from_str(s).map_err(|e| CustodiaError::Config {
            reason: format!("failed to parse audit config TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> CustodiaResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CustodiaError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
