//! Storage abstractions for DocVault.
//!
//! Two independent contracts live here:
//! - [`ObjectStore`]: durable put/get/delete of opaque ciphertext blobs
//! - [`MetadataRepository`]: durable CRUD of [`StoredObject`] records
//!
//! # Design Principles
//! - Vendor isolation: no backend-specific logic in vault or crypto modules
//! - Async operations: every call may be remote and slow
//! - Unified error semantics: transient failures surface as `Error::Transient`
//!   so the orchestrator can retry them

pub mod local;
pub mod memory;
pub mod metadata;
pub mod provider;
pub mod record;
pub mod sqlite;

pub use local::LocalObjectStore;
pub use memory::{MemoryMetadataRepository, MemoryObjectStore};
pub use metadata::MetadataRepository;
pub use provider::{BlobInfo, ObjectStore};
pub use record::{AccessLevel, StoredObject};
pub use sqlite::SqliteMetadataRepository;
