//! Audit event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use docvault_common::ObjectId;

/// Sequence carried by an event queued before its object's history could be
/// read. The logger numbers it before delivery; sinks never see it.
pub const UNSEQUENCED: u64 = 0;

/// Kind of lifecycle transition being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Upload,
    Download,
    Analyze,
    Delete,
    ExpiryCleanup,
    AccessDenied,
}

impl AuditEventType {
    /// Whether the event closes the object's history.
    pub fn is_terminal(self) -> bool {
        matches!(self, AuditEventType::Delete | AuditEventType::ExpiryCleanup)
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditEventType::Upload => "upload",
            AuditEventType::Download => "download",
            AuditEventType::Analyze => "analyze",
            AuditEventType::Delete => "delete",
            AuditEventType::ExpiryCleanup => "expiry_cleanup",
            AuditEventType::AccessDenied => "access_denied",
        };
        f.write_str(name)
    }
}

/// Result of the attempt an event describes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AuditOutcome {
    #[default]
    Success,
    /// The attempt failed; the reason is a short error kind, never detail.
    Failed(String),
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuditOutcome::Success)
    }
}

/// Where a request came from, as reported by the edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// An event to be recorded; the logger assigns id, sequence and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRequest {
    pub object_id: ObjectId,
    pub event_type: AuditEventType,
    pub actor_id: Option<String>,
    pub context: Option<AuditContext>,
    pub outcome: AuditOutcome,
}

impl AuditRequest {
    /// Create a request for `event_type` on `object_id`.
    pub fn new(object_id: ObjectId, event_type: AuditEventType) -> Self {
        Self {
            object_id,
            event_type,
            actor_id: None,
            context: None,
            outcome: AuditOutcome::Success,
        }
    }

    /// Attribute the event to an actor.
    pub fn actor(mut self, actor_id: Option<String>) -> Self {
        self.actor_id = actor_id;
        self
    }

    /// Attach request origin.
    pub fn context(mut self, context: Option<AuditContext>) -> Self {
        self.context = context;
        self
    }

    /// Record the attempt as failed with `reason`.
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Failed(reason.into());
        self
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub object_id: ObjectId,
    /// Per-object sequence number, starting at 1. [`UNSEQUENCED`] only while
    /// the event waits in the outbox.
    pub sequence: u64,
    pub actor_id: Option<String>,
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AuditContext>,
    #[serde(default)]
    pub outcome: AuditOutcome,
}
