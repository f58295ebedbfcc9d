//! Audit sinks: the append-only stream consumed by compliance tooling.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::event::AuditEvent;
use docvault_common::{Error, ObjectId, Result};

/// Destination for delivered audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event. Must be durable once `Ok` is returned.
    async fn write(&self, event: &AuditEvent) -> Result<()>;

    /// Highest sequence number already accepted for `object_id`.
    ///
    /// Used to continue numbering after a restart. Sinks that cannot answer
    /// return `Ok(None)`.
    async fn last_sequence(&self, _object_id: &ObjectId) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// In-memory sink for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every delivered event, in delivery order.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Delivered events for one object.
    pub async fn events_for(&self, object_id: &ObjectId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| &event.object_id == object_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn last_sequence(&self, object_id: &ObjectId) -> Result<Option<u64>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|event| &event.object_id == object_id)
            .map(|event| event.sequence)
            .max())
    }
}

/// Sink appending one JSON object per line to a file.
///
/// A line without its trailing newline is a write that never completed; it
/// is ignored when reading and cut off before the next append.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    // Serializes appends so lines never interleave. Holds whether the file
    // tail has been checked for a torn line.
    write_lock: Mutex<bool>,
}

impl JsonLinesAuditSink {
    /// Create a sink writing to `path`. The file is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(false),
        }
    }

    /// Read back every event in the file.
    ///
    /// # Errors
    /// - `Serialization` if a complete line is not a valid event
    pub async fn read_events(&self) -> Result<Vec<AuditEvent>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let complete = match content.rfind('\n') {
            Some(end) => &content[..=end],
            None => "",
        };
        if complete.len() != content.len() {
            warn!(path = %self.path.display(), "Ignoring torn last line in audit log");
        }

        complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| Error::Serialization(e.to_string()))
            })
            .collect()
    }

    /// Cut an unterminated last line left by an interrupted append.
    async fn truncate_torn_tail(&self) -> Result<()> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let keep = data
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |end| end + 1);
        if keep < data.len() {
            warn!(
                path = %self.path.display(),
                torn_bytes = data.len() - keep,
                "Truncating torn audit log line"
            );
            let file = OpenOptions::new().write(true).open(&self.path).await?;
            file.set_len(keep as u64).await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut line =
            serde_json::to_vec(event).map_err(|e| Error::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut tail_checked = self.write_lock.lock().await;
        if !*tail_checked {
            self.truncate_torn_tail().await?;
            *tail_checked = true;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn last_sequence(&self, object_id: &ObjectId) -> Result<Option<u64>> {
        Ok(self
            .read_events()
            .await?
            .iter()
            .filter(|event| &event.object_id == object_id)
            .map(|event| event.sequence)
            .max())
    }
}
