use std::time::Duration;

use async_trait::async_trait;

use crate::contract::CatalogResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub id: String,
    pub body: String,
}

/// The two head keys, read together in one atomic operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogHead {
    pub last_sync: Option<String>,
    pub generation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { previous_generation: Option<String> },
    Superseded { current_last_sync: String },
    /// The generation was no longer pending, so a sweep already retired it.
    Abandoned,
}

/// Store operations the writer and reader are built on.
///
/// Every method is one round trip to the backing store, except
/// `retire_generation`, which walks the membership in bounded batches.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Marks `generation` as staging since `staged_at_ms` (epoch millis).
    async fn register_pending(&self, generation: &str, staged_at_ms: i64) -> CatalogResult<()>;

    /// Pending generations that started staging before `cutoff_ms`.
    async fn stale_pending(&self, cutoff_ms: i64) -> CatalogResult<Vec<String>>;

    /// Writes every record of the batch and adds its id to the generation's
    /// membership set.
    async fn stage_records(&self, generation: &str, records: &[StagedRecord])
        -> CatalogResult<()>;

    /// Atomically points readers at `generation`, sets `last_sync` and drops
    /// the generation from the pending set. Refused when the stored
    /// `last_sync` is newer or the generation is no longer pending.
    async fn commit_generation(
        &self,
        generation: &str,
        last_sync: &str,
    ) -> CatalogResult<CommitOutcome>;

    /// Expires a generation's membership set and records after `grace` and
    /// drops it from the pending set. Returns how many records were scheduled
    /// for expiry.
    async fn retire_generation(&self, generation: &str, grace: Duration) -> CatalogResult<usize>;

    async fn read_head(&self) -> CatalogResult<CatalogHead>;

    async fn read_membership(&self, generation: &str) -> CatalogResult<Vec<String>>;

    /// One slot per requested id, `None` when the record is absent.
    async fn fetch_records(
        &self,
        generation: &str,
        ids: &[String],
    ) -> CatalogResult<Vec<Option<Vec<u8>>>>;
}
