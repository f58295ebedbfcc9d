//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use docvault_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Process-wide key-encryption key.
///
/// Loaded once at startup from an external secret source and held only in
/// memory. It never touches bulk data; it only wraps [`DataKey`]s.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Decode a master key from its textual form.
    ///
    /// Accepts 64 hex characters or standard base64 of exactly 32 bytes.
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    /// - Returns `InvalidInput` if the value decodes to anything but 32 bytes.
    ///   The message never echoes the input.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim();

        let decoded = if trimmed.len() == KEY_LENGTH * 2
            && trimmed.bytes().all(|b| b.is_ascii_hexdigit())
        {
            hex::decode(trimmed).ok()
        } else {
            STANDARD.decode(trimmed).ok()
        };
        let decoded = Zeroizing::new(decoded.ok_or_else(|| {
            Error::InvalidInput("master key must be hex or base64".to_string())
        })?);

        if decoded.len() != KEY_LENGTH {
            return Err(Error::InvalidInput(format!(
                "master key must be {} bytes",
                KEY_LENGTH
            )));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Generate a random master key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Base64 form, for handing a freshly generated key to a secret store.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Single-use key for encrypting one object's content.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    key: [u8; KEY_LENGTH],
}

impl DataKey {
    /// Create a data key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Generate a random data key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey([REDACTED])")
    }
}
