use std::str::FromStr;
use std::time::Duration;

use catalog_sync_core::storage_keys::{DEFAULT_ARCHIVE_PREFIX, DEFAULT_KEY_PREFIX};
use catalog_sync_core::writer::{
    DEFAULT_GENERATION_GRACE, DEFAULT_STALE_STAGING_AFTER, DEFAULT_WRITE_BATCH_SIZE,
};
use catalog_sync_core::WriterOptions;
use thiserror::Error;

pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(8_000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub auth_secret_id: Option<String>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub redis: RedisSettings,
    pub key_prefix: String,
    pub archive_bucket: Option<String>,
    pub archive_prefix: String,
    pub write_batch_size: usize,
    pub generation_grace: Duration,
    pub stale_staging_after: Duration,
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let host = value("REDIS_ENDPOINT").ok_or(ConfigError::Missing("REDIS_ENDPOINT"))?;
        let port = parse_or("REDIS_PORT", value("REDIS_PORT"), DEFAULT_REDIS_PORT)?;
        // only the exact literals; anything else must not fall back to plaintext
        let tls = parse_or("REDIS_TLS", value("REDIS_TLS"), true)?;
        let connect_timeout_ms = parse_or(
            "REDIS_CONNECT_TIMEOUT_MS",
            value("REDIS_CONNECT_TIMEOUT_MS"),
            DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        )?;
        let write_batch_size = parse_or(
            "CATALOG_WRITE_BATCH_SIZE",
            value("CATALOG_WRITE_BATCH_SIZE"),
            DEFAULT_WRITE_BATCH_SIZE,
        )?;
        if write_batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CATALOG_WRITE_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        let grace_secs = parse_or(
            "CATALOG_GENERATION_GRACE_SECS",
            value("CATALOG_GENERATION_GRACE_SECS"),
            DEFAULT_GENERATION_GRACE.as_secs(),
        )?;
        let stale_staging_secs = parse_or(
            "CATALOG_STALE_STAGING_SECS",
            value("CATALOG_STALE_STAGING_SECS"),
            DEFAULT_STALE_STAGING_AFTER.as_secs(),
        )?;

        Ok(Self {
            redis: RedisSettings {
                host,
                port,
                tls,
                auth_secret_id: value("REDIS_AUTH_SECRET_ARN"),
                connect_timeout: Duration::from_millis(connect_timeout_ms),
            },
            key_prefix: value("CATALOG_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            archive_bucket: value("CATALOG_BUCKET_NAME"),
            archive_prefix: value("CATALOG_ARCHIVE_PREFIX")
                .unwrap_or_else(|| DEFAULT_ARCHIVE_PREFIX.to_string()),
            write_batch_size,
            generation_grace: Duration::from_secs(grace_secs),
            stale_staging_after: Duration::from_secs(stale_staging_secs),
        })
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            batch_size: self.write_batch_size,
            generation_grace: self.generation_grace,
            stale_staging_after: self.stale_staging_after,
        }
    }
}

fn parse_or<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config = CatalogConfig::from_lookup(lookup(&[("REDIS_ENDPOINT", "cache.local")]))
            .expect("config should load");

        assert_eq!(config.redis.host, "cache.local");
        assert_eq!(config.redis.port, 6379);
        assert!(config.redis.tls);
        assert_eq!(config.redis.auth_secret_id, None);
        assert_eq!(config.redis.connect_timeout, Duration::from_millis(8_000));
        assert_eq!(config.key_prefix, "catalog");
        assert_eq!(config.archive_prefix, "catalog");
        assert_eq!(config.archive_bucket, None);
        assert_eq!(config.writer_options(), WriterOptions::default());
    }

    #[test]
    fn reads_overrides() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("REDIS_ENDPOINT", "cache.local"),
            ("REDIS_PORT", "6380"),
            ("REDIS_TLS", "false"),
            ("REDIS_AUTH_SECRET_ARN", "arn:aws:secretsmanager:example:redis"),
            ("CATALOG_BUCKET_NAME", "catalog-archive"),
            ("CATALOG_WRITE_BATCH_SIZE", "50"),
            ("CATALOG_GENERATION_GRACE_SECS", "30"),
            ("CATALOG_STALE_STAGING_SECS", "1200"),
        ]))
        .expect("config should load");

        assert_eq!(config.redis.port, 6380);
        assert!(!config.redis.tls);
        assert_eq!(
            config.redis.auth_secret_id.as_deref(),
            Some("arn:aws:secretsmanager:example:redis")
        );
        assert_eq!(config.archive_bucket.as_deref(), Some("catalog-archive"));
        assert_eq!(config.write_batch_size, 50);
        assert_eq!(config.generation_grace, Duration::from_secs(30));
        assert_eq!(config.stale_staging_after, Duration::from_secs(1200));
    }

    #[test]
    fn requires_endpoint() {
        let error = CatalogConfig::from_lookup(lookup(&[])).expect_err("config should fail");
        assert_eq!(error, ConfigError::Missing("REDIS_ENDPOINT"));
    }

    #[test]
    fn rejects_invalid_numbers() {
        let error = CatalogConfig::from_lookup(lookup(&[
            ("REDIS_ENDPOINT", "cache.local"),
            ("REDIS_PORT", "not-a-port"),
        ]))
        .expect_err("config should fail");
        assert_eq!(error.to_string(), "REDIS_PORT has invalid value 'not-a-port'");

        let error = CatalogConfig::from_lookup(lookup(&[
            ("REDIS_ENDPOINT", "cache.local"),
            ("CATALOG_WRITE_BATCH_SIZE", "0"),
        ]))
        .expect_err("zero batch size should fail");
        assert!(matches!(error, ConfigError::Invalid { name: "CATALOG_WRITE_BATCH_SIZE", .. }));
    }

    #[test]
    fn tls_flag_accepts_only_true_or_false() {
        for raw in ["TRUE", "1", "yes", "ture"] {
            let error = CatalogConfig::from_lookup(lookup(&[
                ("REDIS_ENDPOINT", "cache.local"),
                ("REDIS_TLS", raw),
            ]))
            .expect_err("unrecognised flag should fail");
            assert_eq!(
                error,
                ConfigError::Invalid {
                    name: "REDIS_TLS",
                    value: raw.to_string(),
                }
            );
        }

        let config = CatalogConfig::from_lookup(lookup(&[
            ("REDIS_ENDPOINT", "cache.local"),
            ("REDIS_TLS", "true"),
        ]))
        .expect("config should load");
        assert!(config.redis.tls);
    }
}
