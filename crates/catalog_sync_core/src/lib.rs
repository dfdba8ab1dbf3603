//! Catalog synchronization domain primitives.
//!
//! This crate owns the service record contract, source row mapping, the store
//! key layout, and the generation-based rebuild and read algorithms. It
//! intentionally excludes AWS SDK, Redis client, and Lambda runtime concerns;
//! those live behind the [`store::CatalogStore`] seam in `catalog_sync_lambda`.

pub mod contract;
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;
pub mod reader;
pub mod source;
pub mod storage_keys;
pub mod store;
pub mod writer;

pub use contract::{
    CatalogError, CatalogResult, CatalogSnapshot, RebuildSummary, ServiceRecord, ValidationError,
};
pub use reader::CatalogReader;
pub use store::CatalogStore;
pub use writer::{CatalogWriter, WriterOptions};
