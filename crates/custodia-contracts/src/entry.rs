//! Audit entry types.
//!
//! `AuditRecord` is the hashed payload — everything the digest commits to.
//! `AuditEntry` is a committed row: the record plus the store-assigned `id`
//! and the two hash fields that make tampering detectable.
//!
//! Once committed, no field of an entry is ever updated or deleted through
//! this subsystem's API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who performed the audited action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    /// Identifier of the user performing the action, if authenticated.
    pub user_id: Option<String>,
    /// Role of the user (e.g. "doctor", "nurse", "admin", "researcher").
    pub user_role: Option<String>,
}

/// What the audited action touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Kind of resource accessed (e.g. "patient", "paper").
    pub resource_type: Option<String>,
    /// Identifier of the specific resource instance.
    pub resource_id: Option<String>,
}

/// Request-level context captured alongside the action.
///
/// `request_details` is a flat map of JSON primitives. Nested objects and
/// arrays are rejected at validation time — canonical serialization for
/// hashing must stay well-defined, so the value space is deliberately
/// narrow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Client IP address, if the action originated from a network request.
    pub ip_address: Option<String>,
    /// Client user agent string.
    pub user_agent: Option<String>,
    /// Caller-defined key/value context (primitive values only).
    pub request_details: Option<BTreeMap<String, serde_json::Value>>,
    /// HTTP status code of the response, if applicable.
    pub response_status: Option<u16>,
}

/// The hashed payload of one audit entry.
///
/// `current_hash` is computed over the canonical serialization of exactly
/// these fields (concatenated with the predecessor's hash), so everything
/// here is immutable once the entry commits. The `timestamp` is stamped by
/// the logger at append time — it is never caller-supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Event time, UTC, set by the logger.
    pub timestamp: DateTime<Utc>,
    /// Who acted.
    pub actor: Actor,
    /// Required non-empty identifier of what occurred (e.g. "VIEW_PATIENT").
    pub action: String,
    /// What was acted on.
    pub resource: Resource,
    /// Request-level context.
    pub context: RequestContext,
    /// Whether protected health information was accessed (caller-asserted).
    pub phi_accessed: bool,
}

/// A committed entry in the audit chain.
///
/// Entries ordered by `id` form exactly one chain: each entry's
/// `previous_hash` equals the `current_hash` of the entry with the
/// immediately preceding `id`, and `previous_hash` is `None` only for the
/// genesis entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Store-assigned, strictly increasing, gapless, starting at 1.
    pub id: u64,
    /// The immutable payload the hashes commit to.
    pub record: AuditRecord,
    /// `current_hash` of the chain-immediate predecessor; `None` at genesis.
    pub previous_hash: Option<String>,
    /// Lowercase 64-character hex SHA-256 over the canonical serialization
    /// of `record` concatenated with `previous_hash`.
    pub current_hash: String,
}
