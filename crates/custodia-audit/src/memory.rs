//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` is the reference implementation of the store
//! contract: a `Vec` behind a `Mutex`, with the conditional append checking
//! the tip under the same lock that performs the insert. It backs the
//! crate's own tests and any caller that wants chain semantics without
//! durability (the durable store lives in `custodia-store`).

use std::sync::Mutex;

use custodia_contracts::{
    entry::{AuditEntry, AuditRecord},
    error::{CustodiaError, CustodiaResult},
};
use custodia_core::{AppendOutcome, AuditStore};

/// An in-memory, append-only audit store.
///
/// # Thread safety
///
/// Every method acquires a `Mutex` internally; the store may be shared
/// freely across threads.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    /// All committed entries in `id` order. Crate-visible so tests can
    /// simulate out-of-band tampering.
    pub(crate) entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CustodiaResult<std::sync::MutexGuard<'_, Vec<AuditEntry>>> {
        self.entries.lock().map_err(|e| CustodiaError::Storage {
            reason: format!("audit store lock poisoned: {}", e),
        })
    }
}

impl AuditStore for InMemoryAuditStore {
    /// Commit `record` if the last entry's `current_hash` still equals
    /// `expected_previous`. Tip comparison and insert happen under one
    /// lock acquisition, so the append is atomic with respect to readers
    /// and other appenders.
    fn append_conditional(
        &self,
        record: &AuditRecord,
        expected_previous: Option<&str>,
        current_hash: &str,
    ) -> CustodiaResult<AppendOutcome> {
        let mut entries = self.lock()?;

        let actual_tip = entries.last().map(|e| e.current_hash.clone());
        if actual_tip.as_deref() != expected_previous {
            return Ok(AppendOutcome::TipMismatch { actual_tip });
        }

        // ids are 1-based and gapless, so the next id is just the count + 1.
        let id = entries.len() as u64 + 1;
        entries.push(AuditEntry {
            id,
            record: record.clone(),
            previous_hash: expected_previous.map(str::to_string),
            current_hash: current_hash.to_string(),
        });

        Ok(AppendOutcome::Committed(id))
    }

    fn tip_hash(&self) -> CustodiaResult<Option<String>> {
        Ok(self.lock()?.last().map(|e| e.current_hash.clone()))
    }

    fn scan(&self, start_id: u64, limit: usize) -> CustodiaResult<Vec<AuditEntry>> {
        let entries = self.lock()?;
        let start_idx = start_id.saturating_sub(1) as usize;
        Ok(entries.iter().skip(start_idx).take(limit).cloned().collect())
    }
}
