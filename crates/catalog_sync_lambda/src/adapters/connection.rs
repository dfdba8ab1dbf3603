use std::sync::Arc;
use std::time::Instant;

use catalog_sync_core::{CatalogError, CatalogResult};
use redis::aio::MultiplexedConnection;
use redis::{ConnectionInfo, IntoConnectionInfo};
use tokio::sync::Mutex;
use tracing::info;

use crate::adapters::secrets::SecretCache;
use crate::config::RedisSettings;

/// One lazily established store connection per process.
///
/// The multiplexed connection is cheap to clone and safe to use from several
/// tasks at once. There is no reconnect policy: callers that observe a broken
/// connection call [`ConnectionManager::reset`] and the next call reconnects.
pub struct ConnectionManager {
    settings: RedisSettings,
    secrets: Option<Arc<SecretCache>>,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl ConnectionManager {
    pub fn new(settings: RedisSettings, secrets: Option<Arc<SecretCache>>) -> Self {
        Self {
            settings,
            secrets,
            connection: Mutex::new(None),
        }
    }

    pub async fn get_connection(&self) -> CatalogResult<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        let password = match &self.secrets {
            Some(secrets) => Some(secrets.get_token().await?),
            None => None,
        };
        let info = connection_info(&self.settings, password)?;
        let client = redis::Client::open(info)
            .map_err(|error| CatalogError::Connection(format!("invalid store address: {error}")))?;

        let started_at = Instant::now();
        let connection = tokio::time::timeout(
            self.settings.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            CatalogError::Connection(format!(
                "connect to {}:{} timed out after {}ms",
                self.settings.host,
                self.settings.port,
                self.settings.connect_timeout.as_millis()
            ))
        })?
        .map_err(|error| {
            CatalogError::Connection(format!(
                "connect to {}:{} failed: {error}",
                self.settings.host, self.settings.port
            ))
        })?;

        info!(
            component = "connection_manager",
            event = "connection_established",
            host = %self.settings.host,
            port = self.settings.port,
            tls = self.settings.tls,
            duration_ms = started_at.elapsed().as_millis() as u64,
        );
        *slot = Some(connection.clone());
        Ok(connection)
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Drops the cached connection so the next call establishes a new one.
    pub async fn reset(&self) {
        self.connection.lock().await.take();
    }
}

pub fn connection_info(
    settings: &RedisSettings,
    password: Option<String>,
) -> CatalogResult<ConnectionInfo> {
    let scheme = if settings.tls { "rediss" } else { "redis" };
    let mut info = format!("{scheme}://{}:{}", settings.host, settings.port)
        .into_connection_info()
        .map_err(|error| CatalogError::Connection(format!("invalid store address: {error}")))?;
    info.redis.password = password;
    Ok(info)
}
