//! The persistence contract between the append protocol and any store.
//!
//! The store — not process memory — is the source of truth for the chain
//! tip, because multiple process instances may share one store. The
//! conditional append is the single serialization point of the whole
//! subsystem: without it, two concurrent appenders computing hashes against
//! the same tip would both succeed and fork the chain.

use custodia_contracts::{
    entry::{AuditEntry, AuditRecord},
    error::CustodiaResult,
};

/// The result of a conditional append attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The row was durably committed under the returned `id` and is now the
    /// chain tip.
    Committed(u64),

    /// The store's tip no longer matched `expected_previous` — another
    /// appender won the race. Nothing was committed.
    TipMismatch {
        /// The tip observed at commit time, so the caller can retry its
        /// computation without a second round trip.
        actual_tip: Option<String>,
    },
}

/// Append-only durable storage for the audit chain.
///
/// Implementations must be safe to share across threads; every method may
/// be called concurrently. Readers running alongside an append see either
/// the committed entry or nothing — never a partial row.
pub trait AuditStore: Send + Sync {
    /// Atomically commit `record` if the store's tip still equals
    /// `expected_previous` — a logical compare-and-swap on the chain tip.
    ///
    /// On success the row is stored with `previous_hash = expected_previous`
    /// and `current_hash`, under an `id` exactly one greater than the
    /// previous maximum (1 for an empty store), and becomes the new tip.
    ///
    /// Returns `TipMismatch` when the tip moved; `Err` only for storage
    /// failures, in which case nothing was committed.
    fn append_conditional(
        &self,
        record: &AuditRecord,
        expected_previous: Option<&str>,
        current_hash: &str,
    ) -> CustodiaResult<AppendOutcome>;

    /// The `current_hash` of the most recently committed entry, or `None`
    /// when the store is empty.
    fn tip_hash(&self) -> CustodiaResult<Option<String>>;

    /// Entries with `id >= start_id` in ascending `id` order, at most
    /// `limit` of them. Restartable: pass the last seen `id + 1` to page.
    fn scan(&self, start_id: u64, limit: usize) -> CustodiaResult<Vec<AuditEntry>>;
}

impl<T: AuditStore + ?Sized> AuditStore for &T {
    fn append_conditional(
        &self,
        record: &AuditRecord,
        expected_previous: Option<&str>,
        current_hash: &str,
    ) -> CustodiaResult<AppendOutcome> {
        (**self).append_conditional(record, expected_previous, current_hash)
    }

    fn tip_hash(&self) -> CustodiaResult<Option<String>> {
        (**self).tip_hash()
    }

    fn scan(&self, start_id: u64, limit: usize) -> CustodiaResult<Vec<AuditEntry>> {
        (**self).scan(start_id, limit)
    }
}

impl<T: AuditStore + ?Sized> AuditStore for std::sync::Arc<T> {
    fn append_conditional(
        &self,
        record: &AuditRecord,
        expected_previous: Option<&str>,
        current_hash: &str,
    ) -> CustodiaResult<AppendOutcome> {
        (**self).append_conditional(record, expected_previous, current_hash)
    }

    fn tip_hash(&self) -> CustodiaResult<Option<String>> {
        (**self).tip_hash()
    }

    fn scan(&self, start_id: u64, limit: usize) -> CustodiaResult<Vec<AuditEntry>> {
        (**self).scan(start_id, limit)
    }
}
