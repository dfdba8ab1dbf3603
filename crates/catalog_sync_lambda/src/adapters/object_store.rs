use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use catalog_sync_core::{CatalogError, CatalogResult};

pub const ARCHIVE_CONTENT_TYPE: &str = "text/csv";

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Stores the raw source payload unmodified under `key`.
    async fn write_archive(&self, key: &str, body: &[u8], source_sha256: &str)
        -> CatalogResult<()>;
}

pub struct S3ArchiveStore {
    bucket: String,
    s3_client: aws_sdk_s3::Client,
}

impl S3ArchiveStore {
    pub fn new(config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            s3_client: aws_sdk_s3::Client::new(config),
        }
    }
}

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    async fn write_archive(
        &self,
        key: &str,
        body: &[u8],
        source_sha256: &str,
    ) -> CatalogResult<()> {
        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(ARCHIVE_CONTENT_TYPE)
            .metadata("source-sha256", source_sha256)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                CatalogError::Archive(format!("failed to write object to s3: {error}"))
            })
    }
}
