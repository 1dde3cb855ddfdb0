//! The caller-facing audit event.
//!
//! `AuditEvent` is what collaborators (EHR, FHIR/HL7, RAG, encryption
//! layers) hand to `AuditLog::log()`. It carries everything an `AuditRecord`
//! needs except the timestamp, which the logger stamps at append time.

use serde::{Deserialize, Serialize};

use crate::entry::{Actor, RequestContext, Resource};

/// An auditable event, built with chained setters.
///
/// Only `action` is required; every other field is optional context.
///
/// ```rust
/// use custodia_contracts::event::AuditEvent;
///
/// let event = AuditEvent::new("VIEW_PATIENT")
///     .user_id("u1")
///     .user_role("doctor")
///     .resource_type("patient")
///     .resource_id("p-4711")
///     .phi_accessed(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Required non-empty identifier of what occurred.
    pub action: String,
    /// Who acted.
    pub actor: Actor,
    /// What was acted on.
    pub resource: Resource,
    /// Request-level context.
    pub context: RequestContext,
    /// Whether protected health information was accessed.
    pub phi_accessed: bool,
}

impl AuditEvent {
    /// Start building an event for the given action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Set the acting user's identifier.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.actor.user_id = Some(user_id.into());
        self
    }

    /// Set the acting user's role.
    pub fn user_role(mut self, user_role: impl Into<String>) -> Self {
        self.actor.user_role = Some(user_role.into());
        self
    }

    /// Set the kind of resource accessed.
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource.resource_type = Some(resource_type.into());
        self
    }

    /// Set the identifier of the specific resource accessed.
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource.resource_id = Some(resource_id.into());
        self
    }

    /// Set the client IP address.
    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.context.ip_address = Some(ip_address.into());
        self
    }

    /// Set the client user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.context.user_agent = Some(user_agent.into());
        self
    }

    /// Add one key/value pair of request context.
    ///
    /// Values must be JSON primitives; the logger rejects nested objects
    /// and arrays at validation time.
    pub fn request_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context
            .request_details
            .get_or_insert_with(Default::default)
            .insert(key.into(), value.into());
        self
    }

    /// Set the HTTP status code of the response.
    pub fn response_status(mut self, status: u16) -> Self {
        self.context.response_status = Some(status);
        self
    }

    /// Assert whether protected health information was accessed.
    pub fn phi_accessed(mut self, phi_accessed: bool) -> Self {
        self.phi_accessed = phi_accessed;
        self
    }
}
