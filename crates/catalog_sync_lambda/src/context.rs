use std::sync::Arc;

use catalog_sync_core::{CatalogReader, CatalogWriter};
use tracing::warn;

use crate::adapters::connection::ConnectionManager;
use crate::adapters::object_store::ArchiveStore;
use crate::adapters::redis_store::RedisCatalogStore;
use crate::adapters::secrets::{SecretCache, SecretSource};
use crate::config::CatalogConfig;
use crate::handlers::response::ApiGatewayResponse;

/// Process-wide state shared by every invocation of a warm Lambda container.
pub struct CatalogContext {
    config: CatalogConfig,
    secrets: Option<Arc<SecretCache>>,
    connections: Arc<ConnectionManager>,
    store: Arc<RedisCatalogStore>,
    archive: Option<Arc<dyn ArchiveStore>>,
}

impl CatalogContext {
    pub fn new(config: CatalogConfig, secret_source: Arc<dyn SecretSource>) -> Self {
        let secrets = config
            .redis
            .auth_secret_id
            .as_ref()
            .map(|secret_id| Arc::new(SecretCache::new(secret_source, secret_id.clone())));
        let connections = Arc::new(ConnectionManager::new(config.redis.clone(), secrets.clone()));
        let store = Arc::new(RedisCatalogStore::new(
            connections.clone(),
            config.key_prefix.clone(),
            config.write_batch_size,
        ));

        Self {
            config,
            secrets,
            connections,
            store,
            archive: None,
        }
    }

    /// Attaches the source archive used by the update path.
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn archive(&self) -> Option<&dyn ArchiveStore> {
        self.archive.as_deref()
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn writer(&self) -> CatalogWriter<RedisCatalogStore> {
        CatalogWriter::new(self.store.clone(), self.config.writer_options())
    }

    pub fn reader(&self) -> CatalogReader<RedisCatalogStore> {
        CatalogReader::with_batch_size(self.store.clone(), self.config.write_batch_size)
    }

    pub fn has_secret_cache(&self) -> bool {
        self.secrets.is_some()
    }

    /// Drops the cached connection and credential.
    pub async fn reset(&self) {
        self.connections.reset().await;
        if let Some(secrets) = &self.secrets {
            secrets.reset().await;
        }
    }

    /// Drops the cached connection after a response that reports it broken,
    /// so the next invocation reconnects. The credential stays cached.
    pub async fn observe(&self, response: &ApiGatewayResponse) {
        if response.status_code < 500 || response.json_body()["error"] != "connection_error" {
            return;
        }
        warn!(
            component = "catalog_context",
            event = "connection_reset",
            reason = "connection_error",
        );
        self.connections.reset().await;
    }
}
