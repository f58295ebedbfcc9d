//! Metadata repository trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::record::StoredObject;
use docvault_common::{Locator, ObjectId, Result};

/// Durable CRUD of object records.
///
/// The vault writes a record only after the blob it references is stored;
/// implementations never have to reason about missing ciphertext.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    /// - `InvalidInput` if the record fails [`StoredObject::validate`]
    /// - `AlreadyExists` if the id or locator is already taken
    async fn create(&self, record: &StoredObject) -> Result<()>;

    /// Look up an active record. Inactive records are reported as absent.
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<StoredObject>>;

    /// Logically delete a record.
    ///
    /// Idempotent. Returns `true` if this call flipped the record from active
    /// to inactive, `false` if it was already inactive or unknown.
    async fn mark_inactive(&self, id: &ObjectId) -> Result<bool>;

    /// Active records whose `expires_at` is strictly before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<StoredObject>>;

    /// Locators referenced by active records.
    async fn active_locators(&self) -> Result<Vec<Locator>>;
}
