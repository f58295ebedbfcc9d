//! Metadata record for a stored object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use docvault_common::{Error, Locator, ObjectId, Result};

/// Who may read an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Owner only. Anonymous uploads are admin-only.
    Private,
    /// Any authenticated principal.
    Internal,
    /// Principals with the admin capability.
    Admin,
}

impl AccessLevel {
    /// Stable string form used by persistent adapters.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::Internal => "internal",
            AccessLevel::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(AccessLevel::Private),
            "internal" => Ok(AccessLevel::Internal),
            "admin" => Ok(AccessLevel::Admin),
            _ => Err(Error::InvalidInput(format!("unknown access level '{}'", s))),
        }
    }
}

/// Durable description of one encrypted object.
///
/// Records are immutable after creation apart from `active`, which only a
/// repository's `mark_inactive` flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: ObjectId,
    /// `None` for anonymous uploads.
    pub owner_id: Option<String>,
    pub original_name: String,
    /// Server-generated, never derived from `original_name`.
    pub storage_locator: Locator,
    /// Plaintext size in bytes.
    pub size: u64,
    pub mime_type: String,
    /// Data key wrapped under the master key.
    pub wrapped_data_key: Vec<u8>,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub associated_analysis_id: Option<String>,
}

impl StoredObject {
    /// Whether the record is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }

    /// Check record invariants before it is persisted.
    ///
    /// # Errors
    /// - `InvalidInput` if the name or MIME type is empty, the wrapped key is
    ///   empty, or `expires_at` is not after `created_at` at millisecond
    ///   precision
    pub fn validate(&self) -> Result<()> {
        if self.original_name.trim().is_empty() {
            return Err(Error::InvalidInput("original name cannot be empty".to_string()));
        }
        if self.mime_type.trim().is_empty() {
            return Err(Error::InvalidInput("mime type cannot be empty".to_string()));
        }
        if self.wrapped_data_key.is_empty() {
            return Err(Error::InvalidInput("wrapped data key missing".to_string()));
        }
        // Timestamps are stored as whole milliseconds.
        if let Some(expires_at) = self.expires_at {
            if expires_at.timestamp_millis() <= self.created_at.timestamp_millis() {
                return Err(Error::InvalidInput(
                    "expiry must be after creation".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_record() -> StoredObject {
        let created_at = Utc::now();
        StoredObject {
            id: ObjectId::new(),
            owner_id: Some("user_1".to_string()),
            original_name: "statement.pdf".to_string(),
            storage_locator: Locator::generate(),
            size: 12_288,
            mime_type: "application/pdf".to_string(),
            wrapped_data_key: vec![1u8; 73],
            access_level: AccessLevel::Private,
            created_at,
            expires_at: Some(created_at + Duration::days(30)),
            active: true,
            associated_analysis_id: None,
        }
    }

    #[test]
    fn test_access_level_string_roundtrip() {
        for level in [AccessLevel::Private, AccessLevel::Internal, AccessLevel::Admin] {
            assert_eq!(level.as_str().parse::<AccessLevel>().unwrap(), level);
        }
        assert!("public".parse::<AccessLevel>().is_err());
    }

    #[test]
    fn test_expiry_check() {
        let record = sample_record();
        assert!(!record.is_expired(record.created_at));
        assert!(record.is_expired(record.created_at + Duration::days(31)));

        let forever = StoredObject {
            expires_at: None,
            ..record
        };
        assert!(!forever.is_expired(forever.created_at + Duration::days(3650)));
    }

    #[test]
    fn test_validate_rejects_backwards_expiry() {
        let mut record = sample_record();
        record.expires_at = Some(record.created_at);
        assert!(record.validate().is_err());

        record.expires_at = Some(record.created_at - Duration::seconds(1));
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_expiry_within_the_same_millisecond() {
        let mut record = sample_record();
        record.created_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        record.expires_at = Some(record.created_at + Duration::microseconds(400));
        assert!(matches!(record.validate(), Err(Error::InvalidInput(_))));

        record.expires_at = Some(record.created_at + Duration::milliseconds(1));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let mut record = sample_record();
        record.original_name = "  ".to_string();
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_record_serialization() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: StoredObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(json.contains("\"access_level\":\"private\""));
    }
}
