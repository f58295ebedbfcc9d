//! Object store trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docvault_common::{Locator, Result};

/// Listing entry for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub locator: Locator,
    /// Size of the ciphertext in bytes.
    pub size: u64,
    /// Last write time as reported by the backend.
    pub modified: DateTime<Utc>,
}

/// Durable store for opaque ciphertext blobs.
///
/// Calls are potentially slow and remote. Implementations report transient
/// conditions (timeouts, throttling, connection loss) as `Error::Transient`
/// so the caller can retry them with backoff.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Store `data` at `locator`, replacing any previous content.
    ///
    /// # Postconditions
    /// - On `Ok`, the blob is durable and readable by `get`
    async fn put(&self, locator: &Locator, data: &[u8]) -> Result<()>;

    /// Fetch the blob at `locator`.
    ///
    /// # Errors
    /// - `NotFound` if nothing is stored at `locator`
    async fn get(&self, locator: &Locator) -> Result<Vec<u8>>;

    /// Remove the blob at `locator`.
    ///
    /// Idempotent: deleting a missing locator is not an error.
    async fn delete(&self, locator: &Locator) -> Result<()>;

    /// Enumerate every stored blob.
    async fn list(&self) -> Result<Vec<BlobInfo>>;
}
