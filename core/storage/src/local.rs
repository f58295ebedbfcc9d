//! Local filesystem object store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::provider::{BlobInfo, ObjectStore};
use docvault_common::{Error, Locator, Result};

const TEMP_SUFFIX: &str = ".partial";

/// Object store backed by a flat directory, one file per locator.
///
/// File names are locators and nothing else. Since a [`Locator`] can only be
/// generated or parsed from its own strict shape, no caller-controlled string
/// ever becomes part of a path.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a new local store with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied or other I/O failure while creating the root
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Sync for constructor
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, locator: &Locator) -> PathBuf {
        self.root.join(locator.as_str())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, locator: &Locator, data: &[u8]) -> Result<()> {
        let final_path = self.blob_path(locator);
        let temp_path = self
            .root
            .join(format!("{}{}", locator.as_str(), TEMP_SUFFIX));

        // Write-then-rename so a crash never leaves a torn blob under the
        // final name.
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &final_path).await?;
        debug!(store = "local", size = data.len(), "Blob written");
        Ok(())
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>> {
        match fs::read(self.blob_path(locator)).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound("blob".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        match fs::remove_file(self.blob_path(locator)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BlobInfo>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut blobs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            // Skips in-flight temp files and anything not written by us
            let Ok(locator) = Locator::parse(name) else {
                continue;
            };

            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            blobs.push(BlobInfo {
                locator,
                size: meta.len(),
                modified,
            });
        }

        Ok(blobs)
    }
}
