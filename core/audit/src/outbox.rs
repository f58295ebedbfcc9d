//! Durable holding area for audit events awaiting delivery.
//!
//! An event enters the outbox before the sink sees it and leaves only after
//! the sink has accepted it. If the process dies in between, the event is
//! delivered again on the next flush.
//!
//! The outbox also remembers the last sequence number handed out for every
//! object whose history is still open, so numbering survives a restart
//! without reading the sink back. The entry is dropped once a successful
//! terminal event (delete or expiry cleanup) has been numbered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::event::{AuditEvent, UNSEQUENCED};
use docvault_common::{Error, ObjectId, Result};

/// Ordered queue of undelivered audit events.
#[async_trait]
pub trait AuditOutbox: Send + Sync {
    /// Append an event. Must be durable once `Ok` is returned.
    async fn push(&self, event: AuditEvent) -> Result<()>;

    /// Undelivered events in insertion order.
    async fn pending(&self) -> Result<Vec<AuditEvent>>;

    /// Drop a delivered event. Unknown ids are ignored.
    async fn remove(&self, event_id: &Uuid) -> Result<()>;

    /// Last sequence handed out for `object_id`.
    ///
    /// `None` if the outbox does not track the object. `Some(UNSEQUENCED)`
    /// while an earlier event for it still waits for its number.
    async fn last_sequence(&self, object_id: &ObjectId) -> Result<Option<u64>>;

    /// Number a queued event. Unknown ids are ignored.
    async fn assign_sequence(&self, event_id: &Uuid, sequence: u64) -> Result<()>;
}

/// Queue contents plus open per-object counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OutboxState {
    events: Vec<AuditEvent>,
    #[serde(default)]
    sequences: HashMap<ObjectId, u64>,
}

impl OutboxState {
    fn push(&mut self, event: AuditEvent) {
        self.track(&event);
        self.events.push(event);
    }

    fn remove(&mut self, event_id: &Uuid) -> bool {
        let before = self.events.len();
        self.events.retain(|event| &event.id != event_id);
        self.events.len() != before
    }

    fn assign(&mut self, event_id: &Uuid, sequence: u64) -> bool {
        let event = match self.events.iter_mut().find(|event| &event.id == event_id) {
            Some(event) => event,
            None => return false,
        };
        event.sequence = sequence;
        let event = event.clone();
        self.track(&event);
        true
    }

    fn track(&mut self, event: &AuditEvent) {
        if event.sequence == UNSEQUENCED {
            return;
        }
        if event.event_type.is_terminal() && event.outcome.is_success() {
            self.sequences.remove(&event.object_id);
        } else {
            self.sequences.insert(event.object_id, event.sequence);
        }
    }

    fn last_sequence(&self, object_id: &ObjectId) -> Option<u64> {
        let mut last = self.sequences.get(object_id).copied();
        for event in self.events.iter().filter(|e| &e.object_id == object_id) {
            if event.sequence == UNSEQUENCED {
                return Some(UNSEQUENCED);
            }
            last = Some(last.map_or(event.sequence, |l| l.max(event.sequence)));
        }
        last
    }
}

/// Volatile outbox for tests and single-process use.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutbox {
    state: Arc<RwLock<OutboxState>>,
}

impl MemoryOutbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditOutbox for MemoryOutbox {
    async fn push(&self, event: AuditEvent) -> Result<()> {
        self.state.write().await.push(event);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<AuditEvent>> {
        Ok(self.state.read().await.events.clone())
    }

    async fn remove(&self, event_id: &Uuid) -> Result<()> {
        self.state.write().await.remove(event_id);
        Ok(())
    }

    async fn last_sequence(&self, object_id: &ObjectId) -> Result<Option<u64>> {
        Ok(self.state.read().await.last_sequence(object_id))
    }

    async fn assign_sequence(&self, event_id: &Uuid, sequence: u64) -> Result<()> {
        self.state.write().await.assign(event_id, sequence);
        Ok(())
    }
}

/// Outbox persisted as a JSON file, rewritten atomically on every change.
pub struct FileOutbox {
    path: PathBuf,
    state: RwLock<OutboxState>,
}

impl FileOutbox {
    /// Open an outbox at `path`, loading any events left from a previous run.
    ///
    /// # Errors
    /// - `Serialization` if the file exists but is not a valid outbox
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice::<OutboxState>(&data)
                .map_err(|e| Error::Serialization(format!("audit outbox: {}", e)))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => OutboxState::default(),
            Err(err) => return Err(err.into()),
        };

        debug!(
            pending = state.events.len(),
            tracked = state.sequences.len(),
            "Audit outbox loaded"
        );
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    async fn persist(&self, state: &OutboxState) -> Result<()> {
        let data = serde_json::to_vec(state).map_err(|e| Error::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `change` and persist; memory is only updated once the file is.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut OutboxState) -> bool + Send,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        if change(&mut next) {
            self.persist(&next).await?;
            *state = next;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditOutbox for FileOutbox {
    async fn push(&self, event: AuditEvent) -> Result<()> {
        self.update(move |state| {
            state.push(event);
            true
        })
        .await
    }

    async fn pending(&self) -> Result<Vec<AuditEvent>> {
        Ok(self.state.read().await.events.clone())
    }

    async fn remove(&self, event_id: &Uuid) -> Result<()> {
        let event_id = *event_id;
        self.update(move |state| state.remove(&event_id)).await
    }

    async fn last_sequence(&self, object_id: &ObjectId) -> Result<Option<u64>> {
        Ok(self.state.read().await.last_sequence(object_id))
    }

    async fn assign_sequence(&self, event_id: &Uuid, sequence: u64) -> Result<()> {
        let event_id = *event_id;
        self.update(move |state| state.assign(&event_id, sequence))
            .await
    }
}
