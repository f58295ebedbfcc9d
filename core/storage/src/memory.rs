//! In-memory backends for testing and development.
//!
//! All data is stored in memory and lost on drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metadata::MetadataRepository;
use crate::provider::{BlobInfo, ObjectStore};
use crate::record::StoredObject;
use docvault_common::{Error, Locator, ObjectId, Result};

#[derive(Debug, Clone)]
struct Blob {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory object store.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    blobs: Arc<RwLock<HashMap<Locator, Blob>>>,
}

impl MemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the store holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Whether a blob exists at `locator`.
    pub async fn contains(&self, locator: &Locator) -> bool {
        self.blobs.read().await.contains_key(locator)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, locator: &Locator, data: &[u8]) -> Result<()> {
        let blob = Blob {
            data: data.to_vec(),
            modified: Utc::now(),
        };
        self.blobs.write().await.insert(locator.clone(), blob);
        Ok(())
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(locator)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| Error::NotFound("blob".to_string()))
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        self.blobs.write().await.remove(locator);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobInfo>> {
        Ok(self
            .blobs
            .read()
            .await
            .iter()
            .map(|(locator, blob)| BlobInfo {
                locator: locator.clone(),
                size: blob.data.len() as u64,
                modified: blob.modified,
            })
            .collect())
    }
}

/// In-memory metadata repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataRepository {
    records: Arc<RwLock<HashMap<ObjectId, StoredObject>>>,
}

impl MemoryMetadataRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a record regardless of its `active` flag.
    ///
    /// Not part of the repository contract; retrieval paths never see
    /// inactive records. Used by tests and diagnostics.
    pub async fn get_any(&self, id: &ObjectId) -> Option<StoredObject> {
        self.records.read().await.get(id).cloned()
    }

    /// Number of records, active or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the repository holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataRepository for MemoryMetadataRepository {
    async fn create(&self, record: &StoredObject) -> Result<()> {
        record.validate()?;

        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(Error::AlreadyExists("object id".to_string()));
        }
        if records
            .values()
            .any(|existing| existing.storage_locator == record.storage_locator)
        {
            return Err(Error::AlreadyExists("storage locator".to_string()));
        }

        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<StoredObject>> {
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .filter(|record| record.active)
            .cloned())
    }

    async fn mark_inactive(&self, id: &ObjectId) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) if record.active => {
                record.active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<StoredObject>> {
        let mut expired: Vec<StoredObject> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.active && record.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|record| record.expires_at);
        Ok(expired)
    }

    async fn active_locators(&self) -> Result<Vec<Locator>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.active)
            .map(|record| record.storage_locator.clone())
            .collect())
    }
}
