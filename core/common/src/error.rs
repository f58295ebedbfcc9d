//! Common error types for DocVault.
//!
//! The caller-visible taxonomy is `NotFound`, `PermissionDenied`, `Integrity`,
//! `KeyUnwrap`, `StorageUnavailable` and `InvalidInput`. The remaining variants
//! are raised by adapters and are either retried or translated by the vault
//! before they reach a caller.

use thiserror::Error;

/// Top-level error type for DocVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Object is missing, logically deleted, or expired.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Principal is not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// AEAD tag verification failed. No plaintext is ever attached.
    #[error("Integrity check failed")]
    Integrity,

    /// Wrapped data key cannot be opened with the current master key.
    #[error("Data key could not be unwrapped")]
    KeyUnwrap,

    /// Retry budget against an external store was exhausted.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transient backend failure; eligible for retry.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// Non-retryable backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Key or parameter misuse inside the crypto layer.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the retry executor may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Io(err) => !matches!(
                err.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
                    | std::io::ErrorKind::InvalidData
            ),
            _ => false,
        }
    }

    /// Short stable name of the variant, used as a failure reason in audit
    /// records. Carries none of the variant's detail.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::PermissionDenied(_) => "permission_denied",
            Error::Integrity => "integrity",
            Error::KeyUnwrap => "key_unwrap",
            Error::StorageUnavailable(_) => "storage_unavailable",
            Error::InvalidInput(_) => "invalid_input",
            Error::Transient(_) => "transient",
            Error::Storage(_) => "storage",
            Error::AlreadyExists(_) => "already_exists",
            Error::Crypto(_) => "crypto",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }

    /// Message safe to hand to an end user.
    ///
    /// `NotFound` and `PermissionDenied` share one message so a caller cannot
    /// discover the existence of objects it may not see. Nothing here carries
    /// key material, locators or backend detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::NotFound(_) | Error::PermissionDenied(_) => "object not found",
            Error::Integrity | Error::KeyUnwrap => "object could not be decrypted",
            Error::StorageUnavailable(_) | Error::Transient(_) => {
                "storage temporarily unavailable"
            }
            Error::InvalidInput(_) => "invalid request",
            _ => "internal error",
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transient("timeout".into()).is_retryable());
        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t")).is_retryable());
        assert!(!Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "n")).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::Integrity.is_retryable());
        assert!(!Error::StorageUnavailable("x".into()).is_retryable());
    }

    #[test]
    fn test_public_message_hides_existence() {
        let missing = Error::NotFound("object".into());
        let denied = Error::PermissionDenied("object".into());
        assert_eq!(missing.public_message(), denied.public_message());
    }

    #[test]
    fn test_kind_omits_detail() {
        assert_eq!(Error::Integrity.kind(), "integrity");
        assert_eq!(
            Error::StorageUnavailable("blob-0f3a at s3://bucket".into()).kind(),
            "storage_unavailable"
        );
    }
}
