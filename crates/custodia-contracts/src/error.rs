//! Error types for the CUSTODIA audit subsystem.
//!
//! All fallible operations return `CustodiaResult<T>`. The variants map to
//! distinct caller policies: validation failures are never retried, storage
//! failures may be retried as a whole, and conflicts mean the bounded retry
//! budget was exhausted under contention.
//!
//! Integrity violations found by the verifier are NOT errors — they are
//! reported data (see `ChainReport`). A broken chain is a successful
//! verification with a negative result, not a failed verification.

use thiserror::Error;

/// The unified error type for the CUSTODIA audit log.
#[derive(Debug, Error)]
pub enum CustodiaError {
    /// The event was rejected before any store interaction.
    ///
    /// Examples: empty `action`, non-primitive values in `request_details`.
    /// Retrying without changing the input cannot succeed.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The store was unreachable or a write failed. Nothing was committed.
    ///
    /// The caller may retry the whole append.
    #[error("storage failure: {reason}")]
    Storage { reason: String },

    /// The append lost the tip race on every attempt.
    ///
    /// Another appender advanced the chain tip faster than this one could
    /// recompute, `attempts` times in a row. The caller may retry.
    #[error("append conflict: lost the chain tip race after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// A configuration value is missing or malformed.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Convenience alias used throughout the CUSTODIA crates.
pub type CustodiaResult<T> = Result<T, CustodiaError>;
