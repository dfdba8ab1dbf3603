use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::contract::{
    format_sync_timestamp, CatalogError, CatalogResult, RebuildSummary, ServiceRecord,
};
use crate::store::{CatalogStore, CommitOutcome, StagedRecord};

pub const DEFAULT_WRITE_BATCH_SIZE: usize = 500;
pub const DEFAULT_GENERATION_GRACE: Duration = Duration::from_secs(300);
/// Longer than any single invocation may run, so a generation still pending
/// after this long belongs to a rebuild that died or lost its commit.
pub const DEFAULT_STALE_STAGING_AFTER: Duration = Duration::from_secs(900);
const DISCARD_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Records staged per round trip.
    pub batch_size: usize,
    /// How long a replaced generation stays readable.
    pub generation_grace: Duration,
    /// Age after which an uncommitted generation is swept by the next rebuild.
    pub stale_staging_after: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_WRITE_BATCH_SIZE,
            generation_grace: DEFAULT_GENERATION_GRACE,
            stale_staging_after: DEFAULT_STALE_STAGING_AFTER,
        }
    }
}

/// Replaces the whole catalog with a new generation.
///
/// Records are staged under a generation id that no other rebuild shares, and
/// become visible only when the generation pointer and `last_sync` are
/// switched together in a single atomic commit. Readers keep resolving the
/// previous generation until then.
///
/// Every staged generation is registered as pending first. Rebuilds that die
/// before committing, or whose commit fails, leave it there, and the next
/// rebuild sweeps pending generations older than `stale_staging_after`.
pub struct CatalogWriter<S: ?Sized> {
    store: Arc<S>,
    options: WriterOptions,
}

impl<S: CatalogStore + ?Sized> CatalogWriter<S> {
    pub fn new(store: Arc<S>, options: WriterOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> WriterOptions {
        self.options
    }

    pub async fn rebuild(&self, records: &[ServiceRecord]) -> CatalogResult<RebuildSummary> {
        self.rebuild_at(records, Utc::now()).await
    }

    pub async fn rebuild_at(
        &self,
        records: &[ServiceRecord],
        synced_at: DateTime<Utc>,
    ) -> CatalogResult<RebuildSummary> {
        let generation = Uuid::new_v4().simple().to_string();
        let last_sync = format_sync_timestamp(synced_at);
        let started_at = Instant::now();
        info!(
            component = "catalog_writer",
            event = "rebuild_started",
            generation = %generation,
            last_sync = %last_sync,
            records = records.len(),
        );

        self.sweep_stale(synced_at).await;
        self.store
            .register_pending(&generation, synced_at.timestamp_millis())
            .await?;

        if let Err(error) = self.stage_all(&generation, records).await {
            warn!(
                component = "catalog_writer",
                event = "rebuild_staging_failed",
                generation = %generation,
                error = %error,
            );
            self.discard(&generation).await;
            return Err(error);
        }

        let outcome = match self.store.commit_generation(&generation, &last_sync).await {
            Ok(outcome) => outcome,
            Err(error) => {
                // the commit may still have applied, so the generation stays
                // pending for a later sweep instead of being discarded here
                warn!(
                    component = "catalog_writer",
                    event = "rebuild_commit_failed",
                    generation = %generation,
                    error = %error,
                );
                return Err(error);
            }
        };

        match outcome {
            CommitOutcome::Committed {
                previous_generation,
            } => {
                if let Some(previous) = previous_generation.filter(|value| value != &generation) {
                    self.retire(&previous).await;
                }
                info!(
                    component = "catalog_writer",
                    event = "rebuild_committed",
                    generation = %generation,
                    last_sync = %last_sync,
                    items_count = records.len(),
                    duration_ms = started_at.elapsed().as_millis() as u64,
                );
                Ok(RebuildSummary {
                    items_count: records.len(),
                    last_sync,
                    generation,
                })
            }
            CommitOutcome::Superseded { current_last_sync } => {
                warn!(
                    component = "catalog_writer",
                    event = "rebuild_superseded",
                    generation = %generation,
                    last_sync = %last_sync,
                    current_last_sync = %current_last_sync,
                );
                self.discard(&generation).await;
                Err(CatalogError::Superseded { current_last_sync })
            }
            CommitOutcome::Abandoned => {
                warn!(
                    component = "catalog_writer",
                    event = "rebuild_abandoned",
                    generation = %generation,
                );
                self.discard(&generation).await;
                Err(CatalogError::Store(format!(
                    "generation {generation} was swept before it could commit"
                )))
            }
        }
    }

    /// Discards pending generations that started staging too long before
    /// `now`. Failures are logged and left for the next rebuild.
    async fn sweep_stale(&self, now: DateTime<Utc>) {
        let stale_after = i64::try_from(self.options.stale_staging_after.as_millis())
            .unwrap_or(i64::MAX);
        let cutoff_ms = now.timestamp_millis().saturating_sub(stale_after);

        let stale = match self.store.stale_pending(cutoff_ms).await {
            Ok(stale) => stale,
            Err(error) => {
                warn!(
                    component = "catalog_writer",
                    event = "stale_sweep_failed",
                    error = %error,
                );
                return;
            }
        };

        for generation in stale {
            info!(
                component = "catalog_writer",
                event = "stale_generation_swept",
                generation = %generation,
            );
            self.discard(&generation).await;
        }
    }

    async fn stage_all(&self, generation: &str, records: &[ServiceRecord]) -> CatalogResult<()> {
        for chunk in records.chunks(self.options.batch_size.max(1)) {
            let staged = chunk
                .iter()
                .map(|record| {
                    serde_json::to_string(record)
                        .map(|body| StagedRecord {
                            id: record.id.clone(),
                            body,
                        })
                        .map_err(|error| {
                            CatalogError::Store(format!(
                                "failed to encode service {}: {error}",
                                record.id
                            ))
                        })
                })
                .collect::<CatalogResult<Vec<_>>>()?;
            self.store.stage_records(generation, &staged).await?;
        }
        Ok(())
    }

    async fn retire(&self, generation: &str) {
        match self
            .store
            .retire_generation(generation, self.options.generation_grace)
            .await
        {
            Ok(records) => info!(
                component = "catalog_writer",
                event = "generation_retired",
                generation = %generation,
                records,
                grace_secs = self.options.generation_grace.as_secs(),
            ),
            Err(error) => warn!(
                component = "catalog_writer",
                event = "generation_retire_failed",
                generation = %generation,
                error = %error,
            ),
        }
    }

    async fn discard(&self, generation: &str) {
        if let Err(error) = self
            .store
            .retire_generation(generation, DISCARD_TTL)
            .await
        {
            warn!(
                component = "catalog_writer",
                event = "staged_generation_discard_failed",
                generation = %generation,
                error = %error,
            );
        }
    }
}
