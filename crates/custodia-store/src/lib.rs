//! # custodia-store
//!
//! SQLite-backed implementation of the CUSTODIA `AuditStore` contract.
//!
//! The store uses WAL mode so verification scans and audit-trail browsing
//! run concurrently with appends without blocking. The conditional append
//! executes inside an IMMEDIATE transaction: the tip is read, compared, and
//! the new row inserted under one write lock, so a reader sees either the
//! committed entry or nothing — never a partial row.
//!
//! A UNIQUE index on `previous_hash` enforces the single-chain invariant at
//! the storage layer even for writes that bypass the tip comparison. SQLite
//! treats NULLs as distinct in unique indexes, so the index does not
//! constrain the genesis row; the tip comparison does (only an empty store
//! accepts an entry with no `previous_hash`).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use tracing::debug;

use custodia_contracts::{
    entry::{Actor, AuditEntry, AuditRecord, RequestContext, Resource},
    error::{CustodiaError, CustodiaResult},
};
use custodia_core::{AppendOutcome, AuditStore};

/// Schema executed at open. Idempotent, so reopening an existing database
/// is safe.
const SCHEMA_SQL: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=FULL;

CREATE TABLE IF NOT EXISTS audit_entries (
    id               INTEGER PRIMARY KEY,
    event_timestamp  TEXT    NOT NULL,
    user_id          TEXT,
    user_role        TEXT,
    action           TEXT    NOT NULL,
    resource_type    TEXT,
    resource_id      TEXT,
    ip_address       TEXT,
    user_agent       TEXT,
    request_details  TEXT,
    response_status  INTEGER,
    phi_accessed     INTEGER NOT NULL,
    previous_hash    TEXT,
    current_hash     TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_audit_previous_hash
    ON audit_entries(previous_hash);
";

/// Column list shared by every SELECT, in `row_to_entry` order.
const ENTRY_COLUMNS: &str = "id, event_timestamp, user_id, user_role, action, \
    resource_type, resource_id, ip_address, user_agent, request_details, \
    response_status, phi_accessed, previous_hash, current_hash";

/// The append-only audit store backed by SQLite.
///
/// Safe to share across threads; the connection is serialized behind a
/// `Mutex`, and the chain-tip race between process instances sharing one
/// database file is resolved by the conditional append itself.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteAuditStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> CustodiaResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(db_err)?;

        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;
        debug!(path = %path.display(), "audit store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory store, for tests and ephemeral use.
    pub fn in_memory() -> CustodiaResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// The database file path, if this store is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total number of committed entries.
    pub fn entry_count(&self) -> CustodiaResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn lock(&self) -> CustodiaResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| CustodiaError::Storage {
            reason: format!("store connection lock poisoned: {}", e),
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn append_conditional(
        &self,
        record: &AuditRecord,
        expected_previous: Option<&str>,
        current_hash: &str,
    ) -> CustodiaResult<AppendOutcome> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let tip: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, current_hash FROM audit_entries ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let (next_id, actual_tip) = match tip {
            Some((id, hash)) => (id + 1, Some(hash)),
            None => (1, None),
        };

        if actual_tip.as_deref() != expected_previous {
            // Dropping the transaction rolls it back.
            return Ok(AppendOutcome::TipMismatch { actual_tip });
        }

        let request_details = record
            .context
            .request_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CustodiaError::Storage {
                reason: format!("failed to serialize request_details: {}", e),
            })?;

        let inserted = tx.execute(
            "INSERT INTO audit_entries (id, event_timestamp, user_id, user_role, action, \
             resource_type, resource_id, ip_address, user_agent, request_details, \
             response_status, phi_accessed, previous_hash, current_hash) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                next_id,
                record
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
                record.actor.user_id,
                record.actor.user_role,
                record.action,
                record.resource.resource_type,
                record.resource.resource_id,
                record.context.ip_address,
                record.context.user_agent,
                request_details,
                record.context.response_status,
                record.phi_accessed,
                expected_previous,
                current_hash,
            ],
        );

        match inserted {
            Ok(_) => {
                tx.commit().map_err(db_err)?;
                Ok(AppendOutcome::Committed(next_id as u64))
            }
            // A unique violation on previous_hash means another writer got
            // past the tip comparison first; that is a lost race, not a
            // storage failure, and the protocol's retry loop handles it.
            Err(e) if is_unique_violation(&e) => Ok(AppendOutcome::TipMismatch { actual_tip }),
            Err(e) => Err(db_err(e)),
        }
    }

    fn tip_hash(&self) -> CustodiaResult<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT current_hash FROM audit_entries ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn scan(&self, start_id: u64, limit: usize) -> CustodiaResult<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM audit_entries WHERE id >= ?1 ORDER BY id ASC LIMIT ?2",
                ENTRY_COLUMNS
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![start_id as i64, limit as i64], row_to_entry)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let id: i64 = row.get(0)?;

    let timestamp: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    let request_details: Option<String> = row.get(9)?;
    let request_details = request_details
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(AuditEntry {
        id: id as u64,
        record: AuditRecord {
            timestamp,
            actor: Actor {
                user_id: row.get(2)?,
                user_role: row.get(3)?,
            },
            action: row.get(4)?,
            resource: Resource {
                resource_type: row.get(5)?,
                resource_id: row.get(6)?,
            },
            context: RequestContext {
                ip_address: row.get(7)?,
                user_agent: row.get(8)?,
                request_details,
                response_status: row.get(10)?,
            },
            phi_accessed: row.get(11)?,
        },
        previous_hash: row.get(12)?,
        current_hash: row.get(13)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn db_err(e: rusqlite::Error) -> CustodiaError {
    CustodiaError::Storage {
        reason: e.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use custodia_audit::{hash_entry, verify_chain, AuditLog};
    use custodia_contracts::{
        entry::{Actor, AuditRecord, RequestContext, Resource},
        event::AuditEvent,
        verify::ViolationKind,
    };
    use custodia_core::{AppendOutcome, AuditStore};

    use super::SqliteAuditStore;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn sample_record(action: &str) -> AuditRecord {
        AuditRecord {
            timestamp: chrono::Utc::now(),
            actor: Actor {
                user_id: Some("u1".to_string()),
                user_role: Some("doctor".to_string()),
            },
            action: action.to_string(),
            resource: Resource::default(),
            context: RequestContext::default(),
            phi_accessed: false,
        }
    }

    /// Append three rich events through the protocol, read them back, and
    /// confirm both field round-trip and chain validity.
    #[test]
    fn append_and_scan_round_trip() {
        let log = AuditLog::new(SqliteAuditStore::in_memory().unwrap());

        log.log(
            AuditEvent::new("VIEW_PATIENT")
                .user_id("u1")
                .user_role("doctor")
                .resource_type("patient")
                .resource_id("p-4711")
                .ip_address("10.0.0.7")
                .user_agent("custodia-test/1.0")
                .request_detail("reason", "treatment_planning")
                .request_detail("fields", "demographics")
                .response_status(200)
                .phi_accessed(true),
        )
        .unwrap();
        log.log(AuditEvent::new("SEARCH_PAPERS").user_id("u2")).unwrap();
        log.log(AuditEvent::new("EXPORT_EHR").phi_accessed(true)).unwrap();

        let entries = log.store().scan(1, 10).unwrap();
        assert_eq!(entries.len(), 3);

        let first = &entries[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.record.action, "VIEW_PATIENT");
        assert_eq!(first.record.actor.user_id.as_deref(), Some("u1"));
        assert_eq!(first.record.actor.user_role.as_deref(), Some("doctor"));
        assert_eq!(first.record.resource.resource_type.as_deref(), Some("patient"));
        assert_eq!(first.record.resource.resource_id.as_deref(), Some("p-4711"));
        assert_eq!(first.record.context.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(first.record.context.response_status, Some(200));
        assert!(first.record.phi_accessed);
        assert_eq!(first.previous_hash, None);

        let details = first.record.context.request_details.as_ref().unwrap();
        assert_eq!(details.get("reason").unwrap(), "treatment_planning");
        assert_eq!(details.get("fields").unwrap(), "demographics");

        let report = log.verify(1000).unwrap();
        assert!(report.ok, "persisted chain must verify");
        assert_eq!(report.entries_checked, 3);
    }

    /// The conditional append commits only against the current tip.
    #[test]
    fn conditional_append_rejects_stale_tip() {
        let store = SqliteAuditStore::in_memory().unwrap();

        let genesis = sample_record("FIRST");
        let genesis_hash = hash_entry(&genesis, None);
        assert_eq!(
            store
                .append_conditional(&genesis, None, &genesis_hash)
                .unwrap(),
            AppendOutcome::Committed(1)
        );

        // A second writer that still believes the store is empty loses,
        // and learns the actual tip from the outcome.
        let stale = sample_record("STALE");
        let stale_hash = hash_entry(&stale, None);
        match store.append_conditional(&stale, None, &stale_hash).unwrap() {
            AppendOutcome::TipMismatch { actual_tip } => {
                assert_eq!(actual_tip.as_deref(), Some(genesis_hash.as_str()));
            }
            other => panic!("expected TipMismatch, got {:?}", other),
        }

        assert_eq!(store.entry_count().unwrap(), 1);
    }

    /// Closing and reopening the database preserves the chain and its tip.
    #[test]
    fn tip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        let tip = {
            let log = AuditLog::new(SqliteAuditStore::open(&path).unwrap());
            log.log(AuditEvent::new("A")).unwrap();
            log.log(AuditEvent::new("B")).unwrap();
            log.store().tip_hash().unwrap()
        };

        let log = AuditLog::new(SqliteAuditStore::open(&path).unwrap());
        assert_eq!(log.store().tip_hash().unwrap(), tip);

        // A fresh handle chains onto the persisted tip.
        assert_eq!(log.log(AuditEvent::new("C")).unwrap(), 3);
        let report = log.verify(1000).unwrap();
        assert!(report.ok);
        assert_eq!(report.entries_checked, 3);
    }

    /// Out-of-band edits through a second connection are detected by
    /// replay verification.
    #[test]
    fn raw_sql_tampering_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        let log = AuditLog::new(SqliteAuditStore::open(&path).unwrap());
        for action in ["VIEW_PATIENT", "SEARCH_PAPERS", "EXPORT_EHR"] {
            log.log(AuditEvent::new(action).user_id("u1")).unwrap();
        }
        assert!(log.verify(1000).unwrap().ok);

        // The attacker edits the database file directly.
        let attacker = rusqlite::Connection::open(&path).unwrap();
        attacker
            .execute(
                "UPDATE audit_entries SET action = 'HIDDEN' WHERE id = 2",
                [],
            )
            .unwrap();

        let report = log.verify(1000).unwrap();
        assert!(!report.ok);
        let violation = report.first_invalid.unwrap();
        assert_eq!(violation.id, 2);
        assert_eq!(violation.kind, ViolationKind::HashMismatch);
    }

    /// The storage layer itself refuses a second entry with an existing
    /// previous_hash, even when the writer bypasses the protocol.
    #[test]
    fn previous_hash_uniqueness_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        let log = AuditLog::new(SqliteAuditStore::open(&path).unwrap());
        log.log(AuditEvent::new("A")).unwrap();
        log.log(AuditEvent::new("B")).unwrap();

        let entries = log.store().scan(1, 10).unwrap();
        let forked_prev = entries[1].previous_hash.clone().unwrap();

        let attacker = rusqlite::Connection::open(&path).unwrap();
        let result = attacker.execute(
            "INSERT INTO audit_entries (id, event_timestamp, action, phi_accessed, \
             previous_hash, current_hash) VALUES (99, '2024-01-01T00:00:00.000000Z', \
             'FORK', 0, ?1, 'deadbeef')",
            rusqlite::params![forked_prev],
        );
        assert!(result.is_err(), "fork insert must violate the unique index");
    }

    /// Racing appenders over one SQLite store produce a single linear
    /// chain with every append committed.
    #[test]
    fn concurrent_appenders_share_one_chain() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 3;

        let store = Arc::new(SqliteAuditStore::in_memory().unwrap());
        let log = AuditLog::with_retry_budget(Arc::clone(&store), 64);

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let log = &log;
                scope.spawn(move || {
                    for i in 0..PER_THREAD {
                        log.log(AuditEvent::new(format!("T{}_{}", t, i))).unwrap();
                    }
                });
            }
        });

        let report = verify_chain(store.as_ref(), 1000).unwrap();
        assert!(report.ok);
        assert_eq!(report.entries_checked, (THREADS * PER_THREAD) as u64);

        let entries = store.scan(1, 100).unwrap();
        let distinct_prev: HashSet<_> =
            entries.iter().map(|e| e.previous_hash.clone()).collect();
        assert_eq!(distinct_prev.len(), entries.len());
    }
}
