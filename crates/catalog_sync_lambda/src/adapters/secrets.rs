use std::sync::Arc;

use async_trait::async_trait;
use catalog_sync_core::{CatalogError, CatalogResult};
use tokio::sync::Mutex;
use tracing::info;

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch_secret(&self, secret_id: &str) -> Result<String, String>;
}

pub struct SecretsManagerSource {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerSource {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(config),
        }
    }
}

#[async_trait]
impl SecretSource for SecretsManagerSource {
    async fn fetch_secret(&self, secret_id: &str) -> Result<String, String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|error| format!("failed to read secret value: {error}"))?;
        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| "secret has no string value".to_string())
    }
}

/// Store credential, fetched once and kept for the life of the process.
///
/// Concurrent first callers wait on the same fetch. A failed fetch is not
/// cached, so the next call tries again.
pub struct SecretCache {
    source: Arc<dyn SecretSource>,
    secret_id: String,
    cached: Mutex<Option<String>>,
}

impl SecretCache {
    pub fn new(source: Arc<dyn SecretSource>, secret_id: impl Into<String>) -> Self {
        Self {
            source,
            secret_id: secret_id.into(),
            cached: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> CatalogResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self
            .source
            .fetch_secret(&self.secret_id)
            .await
            .map_err(CatalogError::Auth)?;
        info!(
            component = "secret_cache",
            event = "credential_cached",
            secret_id = %self.secret_id,
        );
        *cached = Some(token.clone());
        Ok(token)
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Forgets the cached credential.
    pub async fn reset(&self) {
        self.cached.lock().await.take();
    }
}
