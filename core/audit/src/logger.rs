//! Audit logger: sequencing plus at-least-once delivery through the outbox.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{AuditEvent, AuditEventType, AuditRequest, UNSEQUENCED};
use crate::outbox::AuditOutbox;
use crate::sink::AuditSink;
use docvault_common::{Clock, ObjectId, Result, SystemClock};

/// Upper bound on a single sink call.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Records audit events and delivers them to a sink.
///
/// `append` returns once the event is in the outbox. Delivery to the sink is
/// attempted right away, bounded by the sink timeout, and retried by
/// [`flush`](Self::flush) until it succeeds. Events for the same object reach
/// the sink in sequence order.
///
/// Sequence numbers come from the outbox. For an object the outbox no longer
/// tracks, the sink's history is consulted; if the sink cannot answer, the
/// event is queued [`UNSEQUENCED`] and numbered by a later flush.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    outbox: Arc<dyn AuditOutbox>,
    clock: Arc<dyn Clock>,
    sink_timeout: Duration,
    /// Held while numbering and queueing so outbox order matches numbering.
    sequencing: Mutex<()>,
    /// Held while draining the outbox so deliveries never overlap.
    delivery: Mutex<()>,
}

impl AuditLogger {
    /// Create a logger using the system clock.
    pub fn new(sink: Arc<dyn AuditSink>, outbox: Arc<dyn AuditOutbox>) -> Self {
        Self::with_clock(sink, outbox, Arc::new(SystemClock))
    }

    /// Create a logger with an explicit time source.
    pub fn with_clock(
        sink: Arc<dyn AuditSink>,
        outbox: Arc<dyn AuditOutbox>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            outbox,
            clock,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
            sequencing: Mutex::new(()),
            delivery: Mutex::new(()),
        }
    }

    /// Bound every sink call, and the delivery attempt made by `append`.
    pub fn with_sink_timeout(mut self, limit: Duration) -> Self {
        self.sink_timeout = limit;
        self
    }

    /// Record an event.
    ///
    /// Numbers the event, stores it in the outbox and then tries to deliver
    /// everything pending. A slow or failing sink is logged and left for the
    /// next flush.
    ///
    /// # Errors
    /// - The outbox could not persist the event
    pub async fn append(&self, request: AuditRequest) -> Result<AuditEvent> {
        let event = {
            let _sequencing = self.sequencing.lock().await;
            let sequence = self.next_sequence(&request).await?;

            let event = AuditEvent {
                id: Uuid::new_v4(),
                object_id: request.object_id,
                sequence,
                actor_id: request.actor_id,
                event_type: request.event_type,
                timestamp: self.clock.now(),
                context: request.context,
                outcome: request.outcome,
            };
            self.outbox.push(event.clone()).await?;
            event
        };

        debug!(
            object_id = %event.object_id,
            sequence = event.sequence,
            event_type = %event.event_type,
            "Audit event recorded"
        );

        match timeout(self.sink_timeout, self.flush()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Audit delivery deferred"),
            Err(_) => warn!("Audit delivery timed out, deferred"),
        }

        Ok(event)
    }

    /// Deliver pending events to the sink, oldest first.
    ///
    /// Unsequenced events are numbered from the sink's history first. Stops
    /// at the first sink failure so later events never overtake it. Returns
    /// how many events were delivered.
    ///
    /// # Errors
    /// - The outbox could not be read or updated
    pub async fn flush(&self) -> Result<usize> {
        let _delivery = self.delivery.lock().await;
        let pending = self.outbox.pending().await?;

        // Sequences delivered during this pass.
        let mut delivered_now: HashMap<ObjectId, u64> = HashMap::new();
        let mut delivered = 0;
        for mut event in pending {
            if event.sequence == UNSEQUENCED {
                let last = match delivered_now.get(&event.object_id) {
                    Some(last) => *last,
                    None => match self.delivered_sequence(&event.object_id).await {
                        Some(last) => last,
                        None => break,
                    },
                };
                event.sequence = last + 1;
                self.outbox.assign_sequence(&event.id, event.sequence).await?;
                debug!(
                    object_id = %event.object_id,
                    sequence = event.sequence,
                    "Deferred audit event numbered"
                );
            }

            match timeout(self.sink_timeout, self.sink.write(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        event_id = %event.id,
                        object_id = %event.object_id,
                        error = %e,
                        "Audit sink rejected event, will retry"
                    );
                    break;
                }
                Err(_) => {
                    warn!(
                        event_id = %event.id,
                        object_id = %event.object_id,
                        "Audit sink timed out, will retry"
                    );
                    break;
                }
            }
            self.outbox.remove(&event.id).await?;
            delivered_now.insert(event.object_id, event.sequence);
            delivered += 1;
        }

        Ok(delivered)
    }

    /// Number of events not yet delivered.
    pub async fn pending(&self) -> Result<usize> {
        Ok(self.outbox.pending().await?.len())
    }

    /// Flush periodically until `shutdown` flips to `true`.
    pub fn spawn_flusher(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            info!("Audit flusher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.flush().await {
                            Ok(0) => {}
                            Ok(n) => debug!(delivered = n, "Audit events flushed"),
                            Err(e) => warn!(error = %e, "Audit flush failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Err(e) = self.flush().await {
                warn!(error = %e, "Final audit flush failed");
            }
            info!("Audit flusher stopped");
        })
    }

    async fn next_sequence(&self, request: &AuditRequest) -> Result<u64> {
        let tracked = self.outbox.last_sequence(&request.object_id).await?;
        Ok(match tracked {
            Some(UNSEQUENCED) => UNSEQUENCED,
            Some(last) => last + 1,
            // A new object's history starts with its upload.
            None if request.event_type == AuditEventType::Upload => 1,
            None => self
                .delivered_sequence(&request.object_id)
                .await
                .map_or(UNSEQUENCED, |last| last + 1),
        })
    }

    /// Highest sequence the sink holds for `object_id` (0 if none), or `None`
    /// when the sink cannot answer in time.
    async fn delivered_sequence(&self, object_id: &ObjectId) -> Option<u64> {
        match timeout(self.sink_timeout, self.sink.last_sequence(object_id)).await {
            Ok(Ok(last)) => Some(last.unwrap_or(0)),
            Ok(Err(e)) => {
                warn!(object_id = %object_id, error = %e, "Audit history unavailable");
                None
            }
            Err(_) => {
                warn!(object_id = %object_id, "Audit history lookup timed out");
                None
            }
        }
    }
}
