//! Vault service configuration.

use chrono::Duration;

use docvault_common::{Error, Result, RetryConfig};
use docvault_crypto::MasterKey;

/// Environment variable holding the master key (64 hex chars or base64).
pub const ENV_MASTER_KEY: &str = "DOCVAULT_MASTER_KEY";
/// Default object lifetime in seconds, applied when a store request has none.
pub const ENV_DEFAULT_TTL_SECS: &str = "DOCVAULT_DEFAULT_TTL_SECS";
/// Largest accepted plaintext in bytes.
pub const ENV_MAX_OBJECT_BYTES: &str = "DOCVAULT_MAX_OBJECT_BYTES";
/// Retry budget against the object store and metadata repository.
pub const ENV_RETRY_MAX: &str = "DOCVAULT_RETRY_MAX";

/// Default upper bound on plaintext size (100 MiB).
pub const DEFAULT_MAX_OBJECT_BYTES: u64 = 100 * 1024 * 1024;

/// Runtime settings for [`VaultService`](crate::VaultService).
///
/// The master key lives here and nowhere else; it is moved into the service's
/// key manager on construction.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub master_key: MasterKey,
    /// Lifetime for objects stored without an explicit TTL. `None` keeps them
    /// until deleted.
    pub default_ttl: Option<Duration>,
    pub max_object_size: u64,
    pub retry: RetryConfig,
    /// Minimum age of an unreferenced blob before the orphan sweep removes it.
    pub orphan_grace: Duration,
    /// Period of the background maintenance loop.
    pub maintenance_interval: std::time::Duration,
}

impl VaultConfig {
    /// Configuration with defaults around `master_key`.
    pub fn new(master_key: MasterKey) -> Self {
        Self {
            master_key,
            default_ttl: None,
            max_object_size: DEFAULT_MAX_OBJECT_BYTES,
            retry: RetryConfig::default(),
            orphan_grace: Duration::hours(1),
            maintenance_interval: std::time::Duration::from_secs(300),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// - `InvalidInput` if the master key is missing or malformed, or a
    ///   numeric variable does not parse
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encoded = lookup(ENV_MASTER_KEY)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not set", ENV_MASTER_KEY)))?;
        let mut config = Self::new(MasterKey::from_encoded(encoded.trim())?);

        if let Some(secs) = parse_var::<i64, _>(&lookup, ENV_DEFAULT_TTL_SECS)? {
            let ttl = Duration::try_seconds(secs).ok_or_else(|| {
                Error::InvalidInput(format!("{} is out of range", ENV_DEFAULT_TTL_SECS))
            })?;
            config = config.with_default_ttl(Some(ttl))?;
        }
        if let Some(bytes) = parse_var::<u64, _>(&lookup, ENV_MAX_OBJECT_BYTES)? {
            config.max_object_size = bytes;
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, ENV_RETRY_MAX)? {
            config.retry = RetryConfig::new(retries);
        }

        Ok(config)
    }

    /// Set the default TTL.
    ///
    /// # Errors
    /// - `InvalidInput` for a TTL shorter than one millisecond
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Result<Self> {
        if let Some(ttl) = ttl {
            if ttl < Duration::milliseconds(1) {
                return Err(Error::InvalidInput(
                    "default ttl must be at least one millisecond".to_string(),
                ));
            }
        }
        self.default_ttl = ttl;
        Ok(self)
    }

    /// Set the maximum accepted plaintext size.
    pub fn with_max_object_size(mut self, bytes: u64) -> Self {
        self.max_object_size = bytes;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the orphan grace period.
    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = grace;
        self
    }

    /// Set the maintenance period.
    pub fn with_maintenance_interval(mut self, period: std::time::Duration) -> Self {
        self.maintenance_interval = period;
        self
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("{} is not a valid number", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const HEX_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = VaultConfig::from_lookup(lookup(&[(ENV_MASTER_KEY, HEX_KEY)])).unwrap();
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.max_object_size, DEFAULT_MAX_OBJECT_BYTES);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.orphan_grace, Duration::hours(1));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = VaultConfig::from_lookup(lookup(&[
            (ENV_MASTER_KEY, HEX_KEY),
            (ENV_DEFAULT_TTL_SECS, "3600"),
            (ENV_MAX_OBJECT_BYTES, "1024"),
            (ENV_RETRY_MAX, "5"),
        ]))
        .unwrap();
        assert_eq!(config.default_ttl, Some(Duration::hours(1)));
        assert_eq!(config.max_object_size, 1024);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_from_lookup_rejects_bad_input() {
        assert!(matches!(
            VaultConfig::from_lookup(lookup(&[])),
            Err(Error::InvalidInput(_))
        ));
        assert!(VaultConfig::from_lookup(lookup(&[(ENV_MASTER_KEY, "short")])).is_err());
        assert!(VaultConfig::from_lookup(lookup(&[
            (ENV_MASTER_KEY, HEX_KEY),
            (ENV_DEFAULT_TTL_SECS, "0"),
        ]))
        .is_err());
        assert!(VaultConfig::from_lookup(lookup(&[
            (ENV_MASTER_KEY, HEX_KEY),
            (ENV_RETRY_MAX, "many"),
        ]))
        .is_err());
    }

    #[test]
    fn test_from_lookup_rejects_ttl_out_of_range() {
        for secs in ["9223372036854775807", "-9223372036854775808"] {
            assert!(matches!(
                VaultConfig::from_lookup(lookup(&[
                    (ENV_MASTER_KEY, HEX_KEY),
                    (ENV_DEFAULT_TTL_SECS, secs),
                ])),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_default_ttl_below_a_millisecond_rejected() {
        let config = VaultConfig::new(MasterKey::generate());
        assert!(config.with_default_ttl(Some(Duration::microseconds(500))).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = VaultConfig::new(MasterKey::generate());
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("REDACTED"));
    }
}
