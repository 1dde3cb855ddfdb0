//! # custodia-audit
//!
//! Tamper-evident, append-only, SHA-256 hash-chained audit log.
//!
//! ## Overview
//!
//! Every auditable action is recorded as an `AuditEntry` that links to its
//! predecessor via the predecessor's SHA-256 hash. Tampering with any
//! committed entry — even a single byte — breaks the chain and is detected
//! by replay verification.
//!
//! Concurrent appenders are serialized by the store's conditional append (a
//! logical compare-and-swap on the chain tip), never by an in-process lock
//! alone: the store is the source of truth, and multiple process instances
//! may share one store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use custodia_audit::{AuditLog, InMemoryAuditStore};
//! use custodia_contracts::event::AuditEvent;
//!
//! let log = AuditLog::new(InMemoryAuditStore::new());
//! let id = log.log(
//!     AuditEvent::new("VIEW_PATIENT")
//!         .user_id("u1")
//!         .user_role("doctor")
//!         .phi_accessed(true),
//! )?;
//!
//! let report = log.verify(1000)?;
//! assert!(report.ok);
//! ```

pub mod canonical;
pub mod config;
pub mod logger;
pub mod memory;
pub mod verify;

pub use canonical::{canonical_bytes, hash_entry};
pub use config::AuditConfig;
pub use logger::{AuditLog, DEFAULT_RETRY_BUDGET};
pub use memory::InMemoryAuditStore;
pub use verify::{verify_chain, verify_from};

// ── Tests ─────────────────────────────────────────────────────────────────────
