//! Common types used throughout DocVault.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique identifier of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its hyphenated string form.
    ///
    /// # Errors
    /// - Returns `InvalidInput` if `id` is not a UUID
    pub fn parse(id: &str) -> crate::Result<Self> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| crate::Error::InvalidInput("malformed object id".to_string()))
    }

    /// Raw bytes, used as associated data when binding ciphertext to an object.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ObjectId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const LOCATOR_PREFIX: &str = "blob-";

/// Opaque address of a ciphertext blob in the object store.
///
/// Locators are only ever produced by [`Locator::generate`]; parsing accepts
/// exactly that shape, so no user-supplied name can reach a storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    /// Generate a fresh, collision-resistant locator.
    pub fn generate() -> Self {
        Self(format!("{}{}", LOCATOR_PREFIX, Uuid::new_v4().simple()))
    }

    /// Parse a previously generated locator.
    ///
    /// # Errors
    /// - Returns `InvalidInput` unless `raw` is `blob-` followed by 32 lowercase hex digits
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let valid = raw
            .strip_prefix(LOCATOR_PREFIX)
            .map(|rest| {
                rest.len() == 32
                    && rest
                        .bytes()
                        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            })
            .unwrap_or(false);

        if !valid {
            return Err(crate::Error::InvalidInput("malformed locator".to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Locator {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
