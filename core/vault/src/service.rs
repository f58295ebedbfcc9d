//! Vault service: the store / retrieve / delete / sweep lifecycle.
//!
//! The service owns the key manager and coordinates the object store, the
//! metadata repository and the audit logger. Ciphertext is always written
//! before metadata, and metadata is retired before ciphertext is removed, so a
//! crash at any point leaves at worst an unreferenced blob for the orphan
//! sweep, never a record pointing at missing data.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::access::{can_access, Operation, Principal};
use crate::config::VaultConfig;
use docvault_audit::{AuditContext, AuditEventType, AuditLogger, AuditRequest};
use docvault_common::{Clock, Error, Locator, ObjectId, Result, RetryExecutor, SystemClock};
use docvault_crypto::{decrypt, encrypt, Encrypted, KeyManager, Sealed, WrappedKey};
use docvault_storage::{AccessLevel, BlobInfo, MetadataRepository, ObjectStore, StoredObject};

/// Lifecycle position of an object, reported in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Requested,
    Encrypting,
    Stored,
    Retrieving,
    Decrypted,
    ExpiryPending,
    Deleted,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectState::Requested => "requested",
            ObjectState::Encrypting => "encrypting",
            ObjectState::Stored => "stored",
            ObjectState::Retrieving => "retrieving",
            ObjectState::Decrypted => "decrypted",
            ObjectState::ExpiryPending => "expiry_pending",
            ObjectState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Why an object is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Download,
    Analyze,
}

impl Intent {
    fn event_type(self) -> AuditEventType {
        match self {
            Intent::Download => AuditEventType::Download,
            Intent::Analyze => AuditEventType::Analyze,
        }
    }
}

/// Input to [`VaultService::store`].
pub struct StoreRequest {
    pub plaintext: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
    pub owner_id: Option<String>,
    pub access_level: AccessLevel,
    /// Overrides the configured default TTL.
    pub ttl: Option<Duration>,
    pub associated_analysis_id: Option<String>,
    pub context: Option<AuditContext>,
}

impl StoreRequest {
    /// A private, anonymous upload with no TTL override.
    pub fn new(
        plaintext: impl Into<Vec<u8>>,
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            plaintext: plaintext.into(),
            original_name: original_name.into(),
            mime_type: mime_type.into(),
            owner_id: None,
            access_level: AccessLevel::Private,
            ttl: None,
            associated_analysis_id: None,
            context: None,
        }
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn access_level(mut self, level: AccessLevel) -> Self {
        self.access_level = level;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn analysis_id(mut self, analysis_id: impl Into<String>) -> Self {
        self.associated_analysis_id = Some(analysis_id.into());
        self
    }

    pub fn context(mut self, context: AuditContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Debug for StoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRequest")
            .field("plaintext", &format_args!("{} bytes", self.plaintext.len()))
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("owner_id", &self.owner_id)
            .field("access_level", &self.access_level)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Caller-facing view of a record. Locator and wrapped key are withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub owner_id: Option<String>,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub associated_analysis_id: Option<String>,
}

impl From<&StoredObject> for ObjectInfo {
    fn from(record: &StoredObject) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id.clone(),
            original_name: record.original_name.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
            access_level: record.access_level,
            created_at: record.created_at,
            expires_at: record.expires_at,
            associated_analysis_id: record.associated_analysis_id.clone(),
        }
    }
}

/// Decrypted object returned by [`VaultService::retrieve`].
pub struct Retrieved {
    pub bytes: Vec<u8>,
    pub info: ObjectInfo,
}

impl fmt::Debug for Retrieved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrieved")
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .field("info", &self.info)
            .finish()
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates looked at.
    pub examined: usize,
    pub removed: usize,
    /// Candidates left in place after an error; retried on the next sweep.
    pub failed: usize,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired: SweepReport,
    pub orphans: SweepReport,
    pub audit_delivered: usize,
}

/// Orchestrates encryption, storage, access control and auditing.
pub struct VaultService {
    keys: KeyManager,
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataRepository>,
    audit: Arc<AuditLogger>,
    clock: Arc<dyn Clock>,
    retry: RetryExecutor,
    default_ttl: Option<Duration>,
    max_object_size: u64,
    orphan_grace: Duration,
    maintenance_interval: std::time::Duration,
}

impl VaultService {
    /// Build a service. The master key moves out of `config` into the key
    /// manager.
    pub fn new(
        config: VaultConfig,
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataRepository>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        info!(object_store = objects.name(), "Vault service initialized");
        Self {
            keys: KeyManager::new(config.master_key),
            objects,
            metadata,
            audit,
            clock: Arc::new(SystemClock),
            retry: RetryExecutor::new(config.retry),
            default_ttl: config.default_ttl,
            max_object_size: config.max_object_size,
            orphan_grace: config.orphan_grace,
            maintenance_interval: config.maintenance_interval,
        }
    }

    /// Replace the time source used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The audit logger events are recorded through.
    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Encrypt and persist a new object.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty name or MIME type, a non-positive TTL, or
    ///   a plaintext above the configured maximum
    /// - `StorageUnavailable` when a store stays unreachable past the retry
    ///   budget; if this happens after the ciphertext write the blob is left
    ///   for the orphan sweep and no metadata exists
    pub async fn store(&self, request: StoreRequest) -> Result<ObjectId> {
        self.validate(&request)?;

        let id = ObjectId::new();
        let now = self.clock.now();
        let expires_at = match request.ttl.or(self.default_ttl) {
            Some(ttl) => Some(
                now.checked_add_signed(ttl)
                    .ok_or_else(|| Error::InvalidInput("ttl is out of range".to_string()))?,
            ),
            None => None,
        };
        debug!(
            object_id = %id,
            state = %ObjectState::Requested,
            size = request.plaintext.len(),
            "Store requested"
        );

        debug!(object_id = %id, state = %ObjectState::Encrypting, "Encrypting object");
        let Encrypted { sealed, key } = encrypt(&request.plaintext, None, id.as_bytes())?;
        let wrapped = self.keys.wrap_key(&key, id.as_bytes())?;
        drop(key);

        let locator = Locator::generate();
        if let Err(e) = self.put_blob(&locator, sealed.to_bytes()).await {
            self.record_event(
                AuditRequest::new(id, AuditEventType::Upload)
                    .actor(request.owner_id)
                    .context(request.context)
                    .failed(e.kind()),
            )
            .await;
            return Err(e);
        }

        let record = StoredObject {
            id,
            owner_id: request.owner_id.clone(),
            original_name: request.original_name,
            storage_locator: locator.clone(),
            size: request.plaintext.len() as u64,
            mime_type: request.mime_type,
            wrapped_data_key: wrapped.into_bytes(),
            access_level: request.access_level,
            created_at: now,
            expires_at,
            active: true,
            associated_analysis_id: request.associated_analysis_id,
        };

        if let Err(e) = self.create_record(record).await {
            warn!(
                object_id = %id,
                error = %e,
                "Metadata write failed, ciphertext left for orphan sweep"
            );
            debug!(object_id = %id, locator = %locator, "Orphaned blob");
            self.record_event(
                AuditRequest::new(id, AuditEventType::Upload)
                    .actor(request.owner_id)
                    .context(request.context)
                    .failed(e.kind()),
            )
            .await;
            return Err(e);
        }

        debug!(object_id = %id, state = %ObjectState::Stored, "Object stored");
        self.record_event(
            AuditRequest::new(id, AuditEventType::Upload)
                .actor(request.owner_id)
                .context(request.context),
        )
        .await;

        Ok(id)
    }

    /// Decrypt an object for `principal`.
    ///
    /// Every attempt on an existing record is audited, failed ones with the
    /// failure kind as outcome.
    ///
    /// # Errors
    /// - `NotFound` if the object is missing, deleted, or expired
    /// - `PermissionDenied` if the principal may not read it
    /// - `KeyUnwrap` if the wrapped key cannot be opened
    /// - `Integrity` if the ciphertext fails authentication
    pub async fn retrieve(
        &self,
        id: &ObjectId,
        principal: &Principal,
        intent: Intent,
    ) -> Result<Retrieved> {
        let record = self.load_active(id).await?;

        if !can_access(&record, principal, Operation::Read) {
            self.deny(id, principal).await;
            return Err(Error::PermissionDenied("object".to_string()));
        }

        let attempt = AuditRequest::new(*id, intent.event_type())
            .actor(principal.id.clone())
            .context(principal.context.clone());

        if record.is_expired(self.clock.now()) {
            debug!(
                object_id = %id,
                state = %ObjectState::ExpiryPending,
                cause = "expired",
                "Retrieve refused"
            );
            self.record_event(attempt.failed("expired")).await;
            return Err(Error::NotFound("object".to_string()));
        }

        debug!(object_id = %id, state = %ObjectState::Retrieving, ?intent, "Retrieving object");
        match self.open(&record).await {
            Ok(bytes) => {
                debug!(object_id = %id, state = %ObjectState::Decrypted, "Object decrypted");
                self.record_event(attempt).await;
                Ok(Retrieved {
                    bytes,
                    info: ObjectInfo::from(&record),
                })
            }
            Err(e) => {
                self.record_event(attempt.failed(e.kind())).await;
                Err(e)
            }
        }
    }

    /// Unwrap the data key, fetch the ciphertext and decrypt it.
    async fn open(&self, record: &StoredObject) -> Result<Vec<u8>> {
        let id = record.id;
        let wrapped = WrappedKey::from_bytes(record.wrapped_data_key.clone());
        let key = self.keys.unwrap_key(&wrapped, id.as_bytes()).map_err(|e| {
            warn!(object_id = %id, "Data key unwrap failed");
            e
        })?;

        let blob = self.get_blob(&record.storage_locator).await.map_err(|e| {
            if matches!(e, Error::NotFound(_)) {
                error!(object_id = %id, "Active record references a missing blob");
            }
            e
        })?;
        let sealed = Sealed::from_bytes(&blob)?;
        decrypt(&sealed, &key, id.as_bytes()).map_err(|e| {
            warn!(object_id = %id, "Ciphertext failed authentication");
            e
        })
    }

    /// Delete an object. Deleting a missing or already deleted object succeeds.
    ///
    /// # Errors
    /// - `PermissionDenied` unless the principal owns the object or is admin
    /// - `StorageUnavailable` if the metadata repository stays unreachable
    pub async fn delete(&self, id: &ObjectId, principal: &Principal) -> Result<()> {
        let record = match self.find_record(id).await? {
            Some(record) => record,
            None => {
                debug!(object_id = %id, "Delete of absent object");
                return Ok(());
            }
        };

        if !can_access(&record, principal, Operation::Delete) {
            self.deny(id, principal).await;
            return Err(Error::PermissionDenied("object".to_string()));
        }

        if let Err(e) = self.retire(&record, principal, AuditEventType::Delete).await {
            self.record_event(
                AuditRequest::new(*id, AuditEventType::Delete)
                    .actor(principal.id.clone())
                    .context(principal.context.clone())
                    .failed(e.kind()),
            )
            .await;
            return Err(e);
        }
        Ok(())
    }

    /// Retire every active record whose expiry has passed.
    ///
    /// Per-object failures are counted and left for the next sweep.
    ///
    /// # Errors
    /// - `StorageUnavailable` if the expired set cannot be listed
    pub async fn expiry_sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let metadata = self.metadata.clone();
        let expired = self
            .retry
            .execute("metadata list expired", move || {
                let metadata = metadata.clone();
                async move { metadata.list_expired(now).await }
            })
            .await?;

        let system = Principal::system();
        let mut report = SweepReport::default();
        for record in expired {
            report.examined += 1;
            debug!(object_id = %record.id, state = %ObjectState::ExpiryPending, "Expiring object");
            match self
                .retire(&record, &system, AuditEventType::ExpiryCleanup)
                .await
            {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(object_id = %record.id, error = %e, "Expiry cleanup failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            removed = report.removed,
            failed = report.failed,
            "Expiry sweep finished"
        );
        Ok(report)
    }

    /// Remove blobs that no active record references.
    ///
    /// Blobs younger than the orphan grace period are skipped so uploads whose
    /// metadata write is still in flight are left alone.
    ///
    /// # Errors
    /// - `StorageUnavailable` if either store cannot be listed
    pub async fn orphan_sweep(&self) -> Result<SweepReport> {
        let cutoff = self.clock.now() - self.orphan_grace;

        // Referenced set is read before the listing so a store racing with
        // the sweep is covered by the grace period.
        let metadata = self.metadata.clone();
        let referenced: HashSet<Locator> = self
            .retry
            .execute("metadata list locators", move || {
                let metadata = metadata.clone();
                async move { metadata.active_locators().await }
            })
            .await?
            .into_iter()
            .collect();

        let objects = self.objects.clone();
        let blobs: Vec<BlobInfo> = self
            .retry
            .execute("object store list", move || {
                let objects = objects.clone();
                async move { objects.list().await }
            })
            .await?;

        let mut report = SweepReport::default();
        for blob in blobs {
            if referenced.contains(&blob.locator) || blob.modified > cutoff {
                continue;
            }
            report.examined += 1;
            match self.delete_blob(&blob.locator).await {
                Ok(()) => {
                    debug!(locator = %blob.locator, size = blob.size, "Orphaned blob removed");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Orphaned blob removal failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            removed = report.removed,
            failed = report.failed,
            "Orphan sweep finished"
        );
        Ok(report)
    }

    /// Run expiry sweep, orphan sweep and an audit flush once.
    ///
    /// # Errors
    /// - The first sweep that could not list its candidates
    pub async fn maintenance_pass(&self) -> Result<MaintenanceReport> {
        let expired = self.expiry_sweep().await?;
        let orphans = self.orphan_sweep().await?;
        let audit_delivered = self.audit.flush().await?;
        Ok(MaintenanceReport {
            expired,
            orphans,
            audit_delivered,
        })
    }

    /// Run [`maintenance_pass`](Self::maintenance_pass) every configured
    /// interval until `shutdown` flips to `true`.
    pub fn run_maintenance(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = self.maintenance_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            info!(interval = ?period, "Vault maintenance started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.maintenance_pass().await {
                            warn!(error = %e, "Maintenance pass failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Vault maintenance stopped");
        })
    }

    fn validate(&self, request: &StoreRequest) -> Result<()> {
        if request.original_name.trim().is_empty() {
            return Err(Error::InvalidInput("original name cannot be empty".to_string()));
        }
        if request.mime_type.trim().is_empty() {
            return Err(Error::InvalidInput("mime type cannot be empty".to_string()));
        }
        // Expiry is persisted at millisecond precision.
        if let Some(ttl) = request.ttl {
            if ttl < Duration::milliseconds(1) {
                return Err(Error::InvalidInput(
                    "ttl must be at least one millisecond".to_string(),
                ));
            }
        }
        if request.plaintext.len() as u64 > self.max_object_size {
            return Err(Error::InvalidInput(format!(
                "object exceeds {} bytes",
                self.max_object_size
            )));
        }
        Ok(())
    }

    /// Mark `record` inactive, remove its blob and audit the transition.
    ///
    /// Returns `false` if another caller retired it first.
    async fn retire(
        &self,
        record: &StoredObject,
        actor: &Principal,
        event_type: AuditEventType,
    ) -> Result<bool> {
        let metadata = self.metadata.clone();
        let id = record.id;
        let retired = self
            .retry
            .execute("metadata mark inactive", move || {
                let metadata = metadata.clone();
                async move { metadata.mark_inactive(&id).await }
            })
            .await?;

        if !retired {
            debug!(object_id = %id, "Object already retired");
            return Ok(false);
        }

        if let Err(e) = self.delete_blob(&record.storage_locator).await {
            warn!(object_id = %id, error = %e, "Blob removal deferred to orphan sweep");
        }

        debug!(object_id = %id, state = %ObjectState::Deleted, %event_type, "Object retired");
        self.record_event(
            AuditRequest::new(id, event_type)
                .actor(actor.id.clone())
                .context(actor.context.clone()),
        )
        .await;

        Ok(true)
    }

    async fn deny(&self, id: &ObjectId, principal: &Principal) {
        debug!(object_id = %id, actor = ?principal.id, "Access denied");
        self.record_event(
            AuditRequest::new(*id, AuditEventType::AccessDenied)
                .actor(principal.id.clone())
                .context(principal.context.clone())
                .failed("permission_denied"),
        )
        .await;
    }

    /// Audit failures are logged, never returned.
    async fn record_event(&self, request: AuditRequest) {
        let object_id = request.object_id;
        let event_type = request.event_type;
        if let Err(e) = self.audit.append(request).await {
            error!(object_id = %object_id, %event_type, error = %e, "Audit event lost");
        }
    }

    async fn load_active(&self, id: &ObjectId) -> Result<StoredObject> {
        self.find_record(id).await?.ok_or_else(|| {
            debug!(object_id = %id, "Object not found");
            Error::NotFound("object".to_string())
        })
    }

    async fn find_record(&self, id: &ObjectId) -> Result<Option<StoredObject>> {
        let metadata = self.metadata.clone();
        let id = *id;
        self.retry
            .execute("metadata lookup", move || {
                let metadata = metadata.clone();
                async move { metadata.find_by_id(&id).await }
            })
            .await
    }

    async fn create_record(&self, record: StoredObject) -> Result<()> {
        let metadata = self.metadata.clone();
        let record = Arc::new(record);
        self.retry
            .execute("metadata create", move || {
                let metadata = metadata.clone();
                let record = record.clone();
                async move { metadata.create(&record).await }
            })
            .await
    }

    async fn put_blob(&self, locator: &Locator, blob: Vec<u8>) -> Result<()> {
        let objects = self.objects.clone();
        let locator = locator.clone();
        let blob = Arc::new(blob);
        self.retry
            .execute("object store put", move || {
                let objects = objects.clone();
                let locator = locator.clone();
                let blob = blob.clone();
                async move { objects.put(&locator, &blob).await }
            })
            .await
    }

    async fn get_blob(&self, locator: &Locator) -> Result<Vec<u8>> {
        let objects = self.objects.clone();
        let locator = locator.clone();
        self.retry
            .execute("object store get", move || {
                let objects = objects.clone();
                let locator = locator.clone();
                async move { objects.get(&locator).await }
            })
            .await
    }

    async fn delete_blob(&self, locator: &Locator) -> Result<()> {
        let objects = self.objects.clone();
        let locator = locator.clone();
        self.retry
            .execute("object store delete", move || {
                let objects = objects.clone();
                let locator = locator.clone();
                async move { objects.delete(&locator).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_audit::{MemoryAuditSink, MemoryOutbox};
    use docvault_common::{ManualClock, RetryConfig};
    use docvault_crypto::MasterKey;
    use docvault_storage::{MemoryMetadataRepository, MemoryObjectStore};

    struct Harness {
        vault: VaultService,
        objects: MemoryObjectStore,
        metadata: MemoryMetadataRepository,
        sink: MemoryAuditSink,
        clock: Arc<ManualClock>,
    }

    fn harness_with(config: VaultConfig) -> Harness {
        let clock = Arc::new(ManualClock::starting_now());
        let sink = MemoryAuditSink::new();
        let audit = Arc::new(AuditLogger::with_clock(
            Arc::new(sink.clone()),
            Arc::new(MemoryOutbox::new()),
            clock.clone(),
        ));
        let objects = MemoryObjectStore::new();
        let metadata = MemoryMetadataRepository::new();
        let vault = VaultService::new(
            config,
            Arc::new(objects.clone()),
            Arc::new(metadata.clone()),
            audit,
        )
        .with_clock(clock.clone());

        Harness {
            vault,
            objects,
            metadata,
            sink,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(VaultConfig::new(MasterKey::generate()).with_retry(RetryConfig::none()))
    }

    fn report_pdf() -> StoreRequest {
        StoreRequest::new(b"quarterly report".to_vec(), "report.pdf", "application/pdf")
            .owner("user_1")
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_input() {
        let h = harness_with(
            VaultConfig::new(MasterKey::generate())
                .with_retry(RetryConfig::none())
                .with_max_object_size(4),
        );

        let cases = vec![
            StoreRequest::new(b"ok".to_vec(), "  ", "text/plain"),
            StoreRequest::new(b"ok".to_vec(), "a.txt", ""),
            StoreRequest::new(b"ok".to_vec(), "a.txt", "text/plain").ttl(Duration::zero()),
            StoreRequest::new(b"ok".to_vec(), "a.txt", "text/plain")
                .ttl(Duration::microseconds(300)),
            StoreRequest::new(b"too large".to_vec(), "a.txt", "text/plain"),
        ];
        for request in cases {
            assert!(matches!(
                h.vault.store(request).await,
                Err(Error::InvalidInput(_))
            ));
        }

        assert!(h.objects.is_empty().await);
        assert!(h.metadata.is_empty().await);
        assert!(h.sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_rejects_ttl_past_the_calendar() {
        let h = harness();
        let err = h
            .vault
            .store(report_pdf().ttl(Duration::days(100_000_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(h.objects.is_empty().await);
        assert!(h.metadata.is_empty().await);
    }

    #[tokio::test]
    async fn test_denied_read_is_audited() {
        let h = harness();
        let id = h.vault.store(report_pdf()).await.unwrap();

        let err = h
            .vault
            .retrieve(&id, &Principal::user("user_2"), Intent::Download)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(
            err.public_message(),
            Error::NotFound("object".into()).public_message()
        );

        let events = h.sink.events_for(&id).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, AuditEventType::AccessDenied);
        assert_eq!(events[1].actor_id.as_deref(), Some("user_2"));
        assert_eq!(events[1].sequence, 2);
    }

    #[tokio::test]
    async fn test_delete_requires_owner_or_admin() {
        let h = harness();
        let id = h.vault.store(report_pdf()).await.unwrap();

        assert!(matches!(
            h.vault.delete(&id, &Principal::user("user_2")).await,
            Err(Error::PermissionDenied(_))
        ));
        assert_eq!(h.objects.len().await, 1);

        h.vault.delete(&id, &Principal::user("user_1")).await.unwrap();
        assert!(h.objects.is_empty().await);
        let record = h.metadata.get_any(&id).await.unwrap();
        assert!(!record.active);

        // Second delete is a no-op and emits nothing.
        h.vault.delete(&id, &Principal::user("user_1")).await.unwrap();
        let kinds: Vec<AuditEventType> = h
            .sink
            .events_for(&id)
            .await
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventType::Upload,
                AuditEventType::AccessDenied,
                AuditEventType::Delete
            ]
        );
    }

    #[tokio::test]
    async fn test_admin_may_delete_any_object() {
        let h = harness();
        let id = h.vault.store(report_pdf()).await.unwrap();

        h.vault.delete(&id, &Principal::admin("ops")).await.unwrap();
        let events = h.sink.events_for(&id).await;
        assert_eq!(events.last().unwrap().actor_id.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_retrieve_returns_info_and_intent() {
        let h = harness();
        let id = h
            .vault
            .store(report_pdf().analysis_id("analysis-7").context(AuditContext {
                ip: Some("203.0.113.9".to_string()),
                user_agent: Some("upload-form".to_string()),
            }))
            .await
            .unwrap();

        let retrieved = h
            .vault
            .retrieve(&id, &Principal::user("user_1"), Intent::Analyze)
            .await
            .unwrap();
        assert_eq!(retrieved.bytes, b"quarterly report");
        assert_eq!(retrieved.info.original_name, "report.pdf");
        assert_eq!(retrieved.info.size, 16);
        assert_eq!(
            retrieved.info.associated_analysis_id.as_deref(),
            Some("analysis-7")
        );
        assert!(!format!("{:?}", retrieved).contains("quarterly"));

        let events = h.sink.events_for(&id).await;
        assert_eq!(events[0].context.as_ref().unwrap().user_agent.as_deref(), Some("upload-form"));
        assert_eq!(events[1].event_type, AuditEventType::Analyze);
    }

    #[tokio::test]
    async fn test_default_ttl_applies_when_request_has_none() {
        let config = VaultConfig::new(MasterKey::generate())
            .with_retry(RetryConfig::none())
            .with_default_ttl(Some(Duration::days(7)))
            .unwrap();
        let h = harness_with(config);

        let id = h.vault.store(report_pdf()).await.unwrap();
        let record = h.metadata.get_any(&id).await.unwrap();
        assert_eq!(record.expires_at, Some(record.created_at + Duration::days(7)));

        let id = h.vault.store(report_pdf().ttl(Duration::hours(1))).await.unwrap();
        let record = h.metadata.get_any(&id).await.unwrap();
        assert_eq!(record.expires_at, Some(record.created_at + Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_maintenance_loop_sweeps_and_stops() {
        let config = VaultConfig::new(MasterKey::generate())
            .with_retry(RetryConfig::none())
            .with_maintenance_interval(std::time::Duration::from_millis(10));
        let h = harness_with(config);
        let id = h
            .vault
            .store(report_pdf().ttl(Duration::seconds(1)))
            .await
            .unwrap();
        h.clock.advance(Duration::seconds(2));

        let vault = Arc::new(h.vault);
        let (tx, rx) = watch::channel(false);
        let handle = vault.clone().run_maintenance(rx);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!h.metadata.get_any(&id).await.unwrap().active);
        assert!(h.objects.is_empty().await);
        let last = h.sink.events_for(&id).await.pop().unwrap();
        assert_eq!(last.event_type, AuditEventType::ExpiryCleanup);
        assert_eq!(last.actor_id.as_deref(), Some(crate::SYSTEM_ACTOR));
    }
}
