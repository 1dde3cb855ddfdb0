//! Verification report types.
//!
//! The verifier replays a range of the chain and reports the first point of
//! divergence, if any. Detected breaks are reported data requiring operator
//! response — never errors, and never auto-repaired.

use serde::{Deserialize, Serialize};

/// Which integrity check an entry failed.
///
/// The two kinds are observably distinct tamper classes: a mutated field
/// breaks the hash check at that entry, while a self-consistent rewrite
/// (hash recomputed to match forged fields) surfaces as a broken link at
/// the successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Recomputing the entry's digest from its stored fields did not
    /// reproduce its stored `current_hash`.
    HashMismatch,
    /// The entry's stored `previous_hash` does not equal its predecessor's
    /// `current_hash`.
    LinkMismatch,
}

/// The first integrity violation found in a verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainViolation {
    /// The `id` of the offending entry.
    pub id: u64,
    /// Which check it failed.
    pub kind: ViolationKind,
}

/// A previously verified `(id, current_hash)` pair.
///
/// Used as a trusted starting point for incremental verification, so large
/// logs are checked in bounded slices without re-scanning from genesis.
/// Archival jobs must record one of these for the retained suffix before
/// pruning anything upstream of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The last verified entry id.
    pub id: u64,
    /// That entry's known-good `current_hash`.
    pub hash: String,
}

/// The outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    /// True when every examined entry passed both checks.
    pub ok: bool,
    /// The first violation found; `None` when `ok`.
    pub first_invalid: Option<ChainViolation>,
    /// How many entries this pass examined.
    pub entries_checked: u64,
    /// Resumption point: the last verified entry, when the examined range
    /// was non-empty and valid. Pass to `verify_from` to continue.
    pub checkpoint: Option<Checkpoint>,
}

impl ChainReport {
    /// A report for an empty (or exhausted) range: trivially valid.
    pub fn empty() -> Self {
        Self {
            ok: true,
            first_invalid: None,
            entries_checked: 0,
            checkpoint: None,
        }
    }
}
