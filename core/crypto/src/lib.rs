//! Cryptographic primitives for DocVault.
//!
//! This module provides:
//! - Authenticated encryption using XChaCha20-Poly1305 (the cipher service)
//! - Per-object data keys and the process-wide master key
//! - Key wrapping of data keys under the master key (envelope encryption)
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Authentication tags come from the AEAD itself; a failed tag never yields plaintext

pub mod aead;
pub mod keys;
pub mod wrap;

pub use aead::{decrypt, encrypt, Encrypted, Sealed};
pub use keys::{DataKey, MasterKey, KEY_LENGTH};
pub use wrap::{KeyManager, WrappedKey, WRAP_VERSION};
