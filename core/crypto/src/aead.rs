//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation. The tag is kept
//! detached so callers see the `(ciphertext, nonce, tag)` triple explicitly.

use chacha20poly1305::{
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
    Key, Tag, XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

use crate::keys::{DataKey, KEY_LENGTH};
use docvault_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Output of one AEAD encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl Sealed {
    /// Frame as `nonce || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len() + TAG_SIZE);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the framing produced by [`Sealed::to_bytes`].
    ///
    /// # Errors
    /// - Returns `Integrity` if the frame is too short to hold a nonce and tag
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::Integrity);
        }

        let (nonce, rest) = bytes.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

        let mut sealed = Self {
            ciphertext: ciphertext.to_vec(),
            nonce: [0u8; NONCE_SIZE],
            tag: [0u8; TAG_SIZE],
        };
        sealed.nonce.copy_from_slice(nonce);
        sealed.tag.copy_from_slice(tag);
        Ok(sealed)
    }
}

/// Ciphertext together with the data key that produced it.
#[derive(Debug)]
pub struct Encrypted {
    pub sealed: Sealed,
    pub key: DataKey,
}

/// Encrypt `plaintext` under `key`, or under a fresh key if none is given.
///
/// # Postconditions
/// - A fresh random nonce is drawn for every call
/// - `aad` is authenticated but not encrypted
/// - Returned key is the one used, zeroized when the caller drops it
///
/// # Errors
/// - Returns `Crypto` if the cipher rejects the input (length limits)
pub fn encrypt(plaintext: &[u8], key: Option<DataKey>, aad: &[u8]) -> Result<Encrypted> {
    let key = key.unwrap_or_else(DataKey::generate);
    let sealed = seal(key.as_bytes(), plaintext, aad)?;
    Ok(Encrypted { sealed, key })
}

/// Decrypt and authenticate a sealed payload.
///
/// # Errors
/// - Returns `Integrity` if tag verification fails (wrong key, wrong `aad`,
///   tampered ciphertext, nonce or tag). No partial plaintext is returned.
pub fn decrypt(sealed: &Sealed, key: &DataKey, aad: &[u8]) -> Result<Vec<u8>> {
    open(key.as_bytes(), sealed, aad)
}

pub(crate) fn seal(key: &[u8; KEY_LENGTH], plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, aad, &mut buffer)
        .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

    let mut sealed = Sealed {
        ciphertext: buffer,
        nonce: [0u8; NONCE_SIZE],
        tag: [0u8; TAG_SIZE],
    };
    sealed.nonce.copy_from_slice(&nonce);
    sealed.tag.copy_from_slice(&tag);
    Ok(sealed)
}

pub(crate) fn open(key: &[u8; KEY_LENGTH], sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut buffer = sealed.ciphertext.clone();
    match cipher.decrypt_in_place_detached(
        XNonce::from_slice(&sealed.nonce),
        aad,
        &mut buffer,
        Tag::from_slice(&sealed.tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(Error::Integrity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"Hello, World!";

        let encrypted = encrypt(plaintext, None, b"object-1").unwrap();
        let decrypted = decrypt(&encrypted.sealed, &encrypted.key, b"object-1").unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let plaintext = b"Test message";
        let encrypted = encrypt(plaintext, None, b"").unwrap();

        assert_eq!(encrypted.sealed.ciphertext.len(), plaintext.len());
        assert_eq!(
            encrypted.sealed.to_bytes().len(),
            NONCE_SIZE + plaintext.len() + TAG_SIZE
        );
    }

    #[test]
    fn test_fresh_key_and_nonce_each_time() {
        let plaintext = b"Same plaintext";

        let a = encrypt(plaintext, None, b"").unwrap();
        let b = encrypt(plaintext, None, b"").unwrap();

        assert_ne!(a.key.as_bytes(), b.key.as_bytes());
        assert_ne!(a.sealed.nonce, b.sealed.nonce);
    }

    #[test]
    fn test_supplied_key_is_used() {
        let key = DataKey::from_bytes([9u8; KEY_LENGTH]);
        let encrypted = encrypt(b"data", Some(key.clone()), b"").unwrap();

        assert_eq!(encrypted.key.as_bytes(), key.as_bytes());
        assert_eq!(decrypt(&encrypted.sealed, &key, b"").unwrap(), b"data");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt(b"Secret data", None, b"").unwrap();
        let other = DataKey::generate();

        assert!(matches!(
            decrypt(&encrypted.sealed, &other, b""),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let encrypted = encrypt(b"Secret data", None, b"object-a").unwrap();

        assert!(matches!(
            decrypt(&encrypted.sealed, &encrypted.key, b"object-b"),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_tampered_parts_fail() {
        let encrypted = encrypt(b"Important data", None, b"").unwrap();

        let mut ct = encrypted.sealed.clone();
        ct.ciphertext[5] ^= 0x01;
        assert!(matches!(decrypt(&ct, &encrypted.key, b""), Err(Error::Integrity)));

        let mut nonce = encrypted.sealed.clone();
        nonce.nonce[0] ^= 0x80;
        assert!(matches!(decrypt(&nonce, &encrypted.key, b""), Err(Error::Integrity)));

        let mut tag = encrypted.sealed.clone();
        tag.tag[TAG_SIZE - 1] ^= 0x01;
        assert!(matches!(decrypt(&tag, &encrypted.key, b""), Err(Error::Integrity)));
    }

    #[test]
    fn test_framing_roundtrip_and_short_frame() {
        let encrypted = encrypt(b"framed", None, b"").unwrap();
        let parsed = Sealed::from_bytes(&encrypted.sealed.to_bytes()).unwrap();
        assert_eq!(parsed, encrypted.sealed);

        assert!(matches!(
            Sealed::from_bytes(&[0u8; NONCE_SIZE + TAG_SIZE - 1]),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let encrypted = encrypt(b"", None, b"").unwrap();
        let decrypted = decrypt(&encrypted.sealed, &encrypted.key, b"").unwrap();
        assert!(decrypted.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..4096),
                          aad in proptest::collection::vec(any::<u8>(), 0..32)) {
            let encrypted = encrypt(&plaintext, None, &aad).unwrap();
            let framed = encrypted.sealed.to_bytes();
            let parsed = Sealed::from_bytes(&framed).unwrap();
            prop_assert_eq!(decrypt(&parsed, &encrypted.key, &aad).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_bit_flip_is_detected(plaintext in proptest::collection::vec(any::<u8>(), 1..256),
                                         position in any::<prop::sample::Index>(),
                                         bit in 0u8..8) {
            let encrypted = encrypt(&plaintext, None, b"").unwrap();
            let mut framed = encrypted.sealed.to_bytes();
            let idx = position.index(framed.len());
            framed[idx] ^= 1 << bit;

            let parsed = Sealed::from_bytes(&framed).unwrap();
            prop_assert!(matches!(decrypt(&parsed, &encrypted.key, b""), Err(Error::Integrity)));
        }
    }
}
