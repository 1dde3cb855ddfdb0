//! The append protocol.
//!
//! `AuditLog` is the explicit handle collaborators hold — constructed once
//! and passed by reference, never a global singleton. It owns the store,
//! the conflict retry budget, and an in-process cache of the chain tip.
//!
//! The cache is an optimization, never an authority: it starts out unknown
//! at construction (the process may not be the only writer, and may have
//! just restarted), is refreshed from the store whenever it is unknown,
//! and is invalidated after any failed or uncertain append. The store's
//! conditional append is what actually serializes concurrent writers.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, warn};

use custodia_contracts::{
    entry::AuditRecord,
    error::{CustodiaError, CustodiaResult},
    event::AuditEvent,
    verify::ChainReport,
};
use custodia_core::{AppendOutcome, AuditStore};

use crate::{canonical::hash_entry, config::AuditConfig, verify::verify_chain};

/// Default number of retries after a lost tip race, before surfacing
/// `CustodiaError::Conflict`.
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// The in-process view of the chain tip.
enum TipCache {
    /// The tip must be read from the store before the next append.
    Unknown,
    /// The tip as last confirmed by the store (`None` = empty store).
    Known(Option<String>),
}

/// A handle to one audit chain.
///
/// Cheap to share by reference; all interior state is behind a `Mutex`
/// that is never held across store I/O, so appenders and readers do not
/// serialize on this handle — they serialize on the store's conditional
/// append, which is the design's single serialization point.
pub struct AuditLog<S> {
    store: S,
    tip: Mutex<TipCache>,
    max_retries: u32,
}

impl<S: AuditStore> AuditLog<S> {
    /// Create a handle with the default retry budget.
    pub fn new(store: S) -> Self {
        Self::with_retry_budget(store, DEFAULT_RETRY_BUDGET)
    }

    /// Create a handle with an explicit retry budget.
    ///
    /// A budget of `n` allows `n + 1` total attempts per `log()` call.
    pub fn with_retry_budget(store: S, max_retries: u32) -> Self {
        Self {
            store,
            tip: Mutex::new(TipCache::Unknown),
            max_retries,
        }
    }

    /// Create a handle configured from an `AuditConfig`.
    pub fn from_config(store: S, config: &AuditConfig) -> Self {
        Self::with_retry_budget(store, config.append.max_retries)
    }

    /// The underlying store, for read paths (verification, browsing).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record one auditable event and return the committed entry id.
    ///
    /// Validation failures are rejected before any store interaction.
    /// Storage failures commit nothing and are surfaced as-is — a caller
    /// for whom the audit record is mandatory must treat them as failure
    /// of the operation being audited (fail-closed). A lost tip race is
    /// retried with a refreshed tip up to the budget, then surfaced as
    /// `CustodiaError::Conflict`.
    pub fn log(&self, event: AuditEvent) -> CustodiaResult<u64> {
        validate(&event)?;

        let record = AuditRecord {
            timestamp: Utc::now(),
            actor: event.actor,
            action: event.action,
            resource: event.resource,
            context: event.context,
            phi_accessed: event.phi_accessed,
        };

        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            let expected = self.tip_snapshot()?;
            let current_hash = hash_entry(&record, expected.as_deref());

            match self
                .store
                .append_conditional(&record, expected.as_deref(), &current_hash)
            {
                Ok(AppendOutcome::Committed(id)) => {
                    self.set_tip(TipCache::Known(Some(current_hash)));
                    debug!(
                        id,
                        action = %record.action,
                        phi_accessed = record.phi_accessed,
                        "audit entry committed"
                    );
                    return Ok(id);
                }
                Ok(AppendOutcome::TipMismatch { actual_tip }) => {
                    warn!(
                        attempt,
                        action = %record.action,
                        "lost append race; refreshing chain tip"
                    );
                    // The losing CAS already told us the real tip.
                    self.set_tip(TipCache::Known(actual_tip));
                }
                Err(e) => {
                    // Uncertain outcome: never trust the cache past this.
                    self.set_tip(TipCache::Unknown);
                    return Err(e);
                }
            }
        }

        self.set_tip(TipCache::Unknown);
        Err(CustodiaError::Conflict { attempts })
    }

    /// Verify the chain from genesis, examining at most `limit` entries.
    ///
    /// Convenience for `verify::verify_chain(self.store(), limit)`.
    pub fn verify(&self, limit: u64) -> CustodiaResult<ChainReport> {
        verify_chain(&self.store, limit)
    }

    // ── Tip cache ─────────────────────────────────────────────────────────────

    /// The tip to compute against: the cached value when known, otherwise
    /// a fresh read from the store (which then primes the cache).
    fn tip_snapshot(&self) -> CustodiaResult<Option<String>> {
        {
            let cache = self.lock_tip()?;
            if let TipCache::Known(tip) = &*cache {
                return Ok(tip.clone());
            }
        }

        // Unknown: the store is the source of truth. The lock is not held
        // across this read; a racing commit just means our snapshot loses
        // the CAS and we retry with the tip it reports.
        let tip = self.store.tip_hash()?;
        *self.lock_tip()? = TipCache::Known(tip.clone());
        Ok(tip)
    }

    fn set_tip(&self, value: TipCache) {
        if let Ok(mut cache) = self.tip.lock() {
            *cache = value;
        }
    }

    fn lock_tip(&self) -> CustodiaResult<MutexGuard<'_, TipCache>> {
        self.tip.lock().map_err(|e| CustodiaError::Storage {
            reason: format!("tip cache lock poisoned: {}", e),
        })
    }
}

/// Reject malformed events before any store interaction.
fn validate(event: &AuditEvent) -> CustodiaResult<()> {
    if event.action.is_empty() {
        return Err(CustodiaError::Validation {
            reason: "action must not be empty".to_string(),
        });
    }

    if let Some(details) = &event.context.request_details {
        for (key, value) in details {
            // Canonical hashing requires a flat map of primitives; arbitrary
            // object graphs would make the serialization rule unstable.
            if value.is_object() || value.is_array() {
                return Err(CustodiaError::Validation {
                    reason: format!("request_details[\"{}\"] must be a JSON primitive", key),
                });
            }
        }
    }

    Ok(())
}
