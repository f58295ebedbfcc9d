//! Append-only audit trail for DocVault.
//!
//! Every lifecycle operation on an object produces one [`AuditEvent`] carrying
//! a per-object sequence number. Events are first recorded in a durable
//! [`outbox`] and then delivered to an [`AuditSink`]; a failing sink delays
//! delivery but never loses an event and never fails the caller's operation.

pub mod event;
pub mod logger;
pub mod outbox;
pub mod sink;

pub use event::{
    AuditContext, AuditEvent, AuditEventType, AuditOutcome, AuditRequest, UNSEQUENCED,
};
pub use logger::{AuditLogger, DEFAULT_SINK_TIMEOUT};
pub use outbox::{AuditOutbox, FileOutbox, MemoryOutbox};
pub use sink::{AuditSink, JsonLinesAuditSink, MemoryAuditSink};
