//! Wire types for the Cloud Controller v3 audit event API
//!
//! Only the fields the pipeline forwards are modelled. `data` is kept as an
//! opaque JSON value because its shape depends on the event `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written over every actor name before an event leaves the collector.
pub const ANONYMIZED_ACTOR: &str = r"¯\_(ツ)_/¯";

/// One audit record as returned by `GET /v3/audit_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for the event
    pub guid: String,

    /// Event type, e.g. `audit.app.update`
    #[serde(rename = "type")]
    pub event_type: String,

    /// User or system resource that performed the action
    pub actor: Participant,

    /// Resource the event acted upon
    pub target: Participant,

    /// Additional type-specific information
    #[serde(default)]
    pub data: serde_json::Value,

    /// Space the event occurred in, if any
    #[serde(default)]
    pub space: Option<ScopeRef>,

    /// Organization the event occurred in, if any
    #[serde(default)]
    pub organization: Option<ScopeRef>,

    pub created_at: DateTime<Utc>,

    #[serde(default, alias = "modified_at", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuditEvent {
    /// Strip the actor's display name.
    pub fn anonymize(&mut self) {
        self.actor.name = ANONYMIZED_ACTOR.to_string();
    }

    /// Anonymize and encode as the JSON payload handed downstream.
    pub fn into_payload(mut self) -> serde_json::Result<Vec<u8>> {
        self.anonymize();
        serde_json::to_vec(&self)
    }
}

/// Actor or target of an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub guid: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

/// Space or organization reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeRef {
    pub guid: String,
}

/// One page of `GET /v3/audit_events`, newest-first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub resources: Vec<AuditEvent>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl EventPage {
    /// Link to the following page, if the server provided a non-empty one.
    pub fn next_link(&self) -> Option<&str> {
        self.pagination
            .next
            .as_ref()
            .and_then(|link| link.href.as_deref())
            .filter(|href| !href.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<Link>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: Option<String>,
}
