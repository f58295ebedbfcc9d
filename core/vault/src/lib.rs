//! Vault engine for DocVault.
//!
//! This module provides:
//! - Envelope encryption of uploaded documents
//! - Access decisions for retrieval and deletion
//! - Expiry and orphan reclamation
//! - Audit events for every lifecycle transition
//!
//! # Architecture
//! [`VaultService`] sits between upstream callers and the storage adapters.
//! Callers only ever see plaintext; everything persisted is ciphertext or
//! metadata.

pub mod access;
pub mod config;
pub mod service;

pub use access::{can_access, Operation, Principal, SYSTEM_ACTOR};
pub use config::VaultConfig;
pub use service::{
    Intent, MaintenanceReport, ObjectInfo, ObjectState, Retrieved, StoreRequest, SweepReport,
    VaultService,
};
