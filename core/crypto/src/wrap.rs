//! Envelope key wrapping.
//!
//! Data keys are encrypted under the master key with the same AEAD used for
//! payloads. A wrapped key is self-contained:
//!
//! ```text
//! version (1) || nonce (24) || encrypted key (32) || tag (16)
//! ```
//!
//! The version byte and a caller-supplied context (the object id) are bound as
//! associated data, so a blob cannot be replayed onto another object or
//! relabelled to a different master-key version.

use std::fmt;

use crate::aead::{open, seal, Sealed, NONCE_SIZE, TAG_SIZE};
use crate::keys::{DataKey, MasterKey, KEY_LENGTH};
use docvault_common::{Error, Result};
use zeroize::Zeroizing;

/// Master-key version written into every new wrapped key.
pub const WRAP_VERSION: u8 = 1;

/// Total length of a wrapped key blob.
pub const WRAPPED_KEY_LENGTH: usize = 1 + NONCE_SIZE + KEY_LENGTH + TAG_SIZE;

/// A data key encrypted under the master key.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Wrap raw bytes read back from a metadata record.
    ///
    /// No validation happens here; a malformed blob fails at unwrap time.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Blob bytes as persisted.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the persisted bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Master-key version tag, if the blob is non-empty.
    pub fn version(&self) -> Option<u8> {
        self.0.first().copied()
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey(v{:?}, {} bytes)", self.version(), self.0.len())
    }
}

/// Wraps and unwraps per-object data keys under the process master key.
#[derive(Debug)]
pub struct KeyManager {
    master: MasterKey,
}

impl KeyManager {
    /// Create a key manager owning `master`.
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Encrypt `key` under the master key, bound to `context`.
    ///
    /// # Errors
    /// - Returns `Crypto` if the cipher fails
    pub fn wrap_key(&self, key: &DataKey, context: &[u8]) -> Result<WrappedKey> {
        let aad = wrap_aad(WRAP_VERSION, context);
        let sealed = seal(self.master.as_bytes(), key.as_bytes(), &aad)?;

        let mut blob = Vec::with_capacity(WRAPPED_KEY_LENGTH);
        blob.push(WRAP_VERSION);
        blob.extend_from_slice(&sealed.to_bytes());
        Ok(WrappedKey(blob))
    }

    /// Recover the data key from `wrapped`.
    ///
    /// # Errors
    /// - Returns `KeyUnwrap` for a truncated or oversized blob, an unknown
    ///   version, a mismatched `context`, tampering, or a different master key
    pub fn unwrap_key(&self, wrapped: &WrappedKey, context: &[u8]) -> Result<DataKey> {
        let bytes = wrapped.as_bytes();
        if bytes.len() != WRAPPED_KEY_LENGTH {
            return Err(Error::KeyUnwrap);
        }

        let version = bytes[0];
        if version != WRAP_VERSION {
            return Err(Error::KeyUnwrap);
        }

        let sealed = Sealed::from_bytes(&bytes[1..]).map_err(|_| Error::KeyUnwrap)?;
        let aad = wrap_aad(version, context);
        let raw = Zeroizing::new(
            open(self.master.as_bytes(), &sealed, &aad).map_err(|_| Error::KeyUnwrap)?,
        );

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&raw);
        Ok(DataKey::from_bytes(key))
    }
}

fn wrap_aad(version: u8, context: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + context.len());
    aad.push(version);
    aad.extend_from_slice(context);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(seed: u8) -> KeyManager {
        KeyManager::new(MasterKey::from_bytes([seed; KEY_LENGTH]))
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let km = manager(1);
        let key = DataKey::generate();

        let wrapped = km.wrap_key(&key, b"object-1").unwrap();
        assert_eq!(wrapped.as_bytes().len(), WRAPPED_KEY_LENGTH);
        assert_eq!(wrapped.version(), Some(WRAP_VERSION));

        let unwrapped = km.unwrap_key(&wrapped, b"object-1").unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrapped_key_does_not_contain_plain_key() {
        let km = manager(1);
        let key = DataKey::from_bytes([0x5A; KEY_LENGTH]);
        let wrapped = km.wrap_key(&key, b"ctx").unwrap();

        assert!(!wrapped
            .as_bytes()
            .windows(KEY_LENGTH)
            .any(|w| w == key.as_bytes()));
    }

    #[test]
    fn test_master_key_mismatch_fails() {
        let wrapped = manager(1).wrap_key(&DataKey::generate(), b"ctx").unwrap();
        assert!(matches!(
            manager(2).unwrap_key(&wrapped, b"ctx"),
            Err(Error::KeyUnwrap)
        ));
    }

    #[test]
    fn test_context_mismatch_fails() {
        let km = manager(1);
        let wrapped = km.wrap_key(&DataKey::generate(), b"object-a").unwrap();
        assert!(matches!(
            km.unwrap_key(&wrapped, b"object-b"),
            Err(Error::KeyUnwrap)
        ));
    }

    #[test]
    fn test_every_bit_flip_fails() {
        let km = manager(3);
        let wrapped = km.wrap_key(&DataKey::generate(), b"ctx").unwrap();

        for idx in 0..WRAPPED_KEY_LENGTH {
            for bit in [0u8, 7] {
                let mut bytes = wrapped.as_bytes().to_vec();
                bytes[idx] ^= 1 << bit;
                let tampered = WrappedKey::from_bytes(bytes);
                assert!(
                    matches!(km.unwrap_key(&tampered, b"ctx"), Err(Error::KeyUnwrap)),
                    "flip at byte {} bit {} was not detected",
                    idx,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_truncated_blob_fails() {
        let km = manager(1);
        let wrapped = km.wrap_key(&DataKey::generate(), b"ctx").unwrap();
        let truncated = WrappedKey::from_bytes(wrapped.as_bytes()[..10].to_vec());

        assert!(matches!(km.unwrap_key(&truncated, b"ctx"), Err(Error::KeyUnwrap)));
        assert!(matches!(
            km.unwrap_key(&WrappedKey::from_bytes(Vec::new()), b"ctx"),
            Err(Error::KeyUnwrap)
        ));
    }
}
