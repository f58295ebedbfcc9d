//! Access decisions for stored objects.
//!
//! Decisions are pure: no I/O, no logging, no errors. The service turns a
//! `false` into `PermissionDenied` and records the denial.

use docvault_audit::AuditContext;
use docvault_storage::{AccessLevel, StoredObject};

/// Actor id used for events raised by the vault itself.
pub const SYSTEM_ACTOR: &str = "system";

/// Who is asking. Role resolution happens upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// `None` for anonymous callers.
    pub id: Option<String>,
    pub admin: bool,
    /// Request origin, copied into audit events.
    pub context: Option<AuditContext>,
}

impl Principal {
    /// An authenticated, non-admin user.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// A caller with no identity.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated user holding the admin capability.
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            admin: true,
            context: None,
        }
    }

    /// The vault's own maintenance identity.
    pub fn system() -> Self {
        Self::admin(SYSTEM_ACTOR)
    }

    /// Attach request origin.
    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = Some(context);
        self
    }

    fn owns(&self, record: &StoredObject) -> bool {
        match (&self.id, &record.owner_id) {
            (Some(id), Some(owner)) => id == owner,
            _ => false,
        }
    }
}

/// What the principal wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Delete,
}

/// Decide whether `principal` may perform `operation` on `record`.
pub fn can_access(record: &StoredObject, principal: &Principal, operation: Operation) -> bool {
    if principal.admin {
        return true;
    }

    match operation {
        Operation::Delete => principal.owns(record),
        Operation::Read => match record.access_level {
            AccessLevel::Private => principal.owns(record),
            AccessLevel::Internal => principal.id.is_some(),
            AccessLevel::Admin => false,
        },
    }
}
