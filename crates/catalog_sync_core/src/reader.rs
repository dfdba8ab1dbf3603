use std::sync::Arc;

use tracing::{debug, warn};

use crate::contract::{CatalogResult, CatalogSnapshot, ServiceRecord, SkipReason, SkippedRecord};
use crate::store::CatalogStore;
use crate::writer::DEFAULT_WRITE_BATCH_SIZE;

/// Serves the active catalog from whichever generation the head points at.
///
/// The generation id and `last_sync` are read together, so a snapshot is
/// always assembled from one complete generation. Records that are missing or
/// fail to decode are reported in `skipped` instead of failing the read.
pub struct CatalogReader<S: ?Sized> {
    store: Arc<S>,
    batch_size: usize,
}

impl<S: CatalogStore + ?Sized> CatalogReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_batch_size(store, DEFAULT_WRITE_BATCH_SIZE)
    }

    pub fn with_batch_size(store: Arc<S>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn get_active_catalog(&self) -> CatalogResult<CatalogSnapshot> {
        let head = self.store.read_head().await?;
        let Some(generation) = head.generation else {
            return Ok(CatalogSnapshot::empty(head.last_sync, None));
        };

        let mut ids = self.store.read_membership(&generation).await?;
        if ids.is_empty() {
            return Ok(CatalogSnapshot::empty(head.last_sync, Some(generation)));
        }
        ids.sort_unstable();

        let mut items = Vec::new();
        let mut skipped = Vec::new();
        for chunk in ids.chunks(self.batch_size) {
            let bodies = self.store.fetch_records(&generation, chunk).await?;
            for (id, body) in chunk.iter().zip(bodies) {
                match decode_record(id, body) {
                    Ok(record) if record.is_active() => items.push(record),
                    Ok(_) => {}
                    Err(skip) => skipped.push(skip),
                }
            }
        }

        if skipped.is_empty() {
            debug!(
                component = "catalog_reader",
                event = "snapshot_read",
                generation = %generation,
                members = ids.len(),
                items = items.len(),
            );
        } else {
            warn!(
                component = "catalog_reader",
                event = "snapshot_incomplete",
                generation = %generation,
                members = ids.len(),
                items = items.len(),
                skipped = skipped.len(),
            );
        }

        Ok(CatalogSnapshot {
            last_sync: head.last_sync,
            generation: Some(generation),
            items,
            skipped,
        })
    }

    /// Looks up one record of the current generation regardless of `estado`.
    pub async fn get_service(&self, id: &str) -> CatalogResult<Option<ServiceRecord>> {
        let head = self.store.read_head().await?;
        let Some(generation) = head.generation else {
            return Ok(None);
        };

        let ids = [id.to_string()];
        let body = self
            .store
            .fetch_records(&generation, &ids)
            .await?
            .into_iter()
            .next()
            .flatten();

        match decode_record(id, body) {
            Ok(record) => Ok(Some(record)),
            Err(skip) => {
                if skip.reason == SkipReason::DecodeError {
                    warn!(
                        component = "catalog_reader",
                        event = "record_decode_failed",
                        generation = %generation,
                        id = %id,
                        detail = skip.detail.as_deref().unwrap_or_default(),
                    );
                }
                Ok(None)
            }
        }
    }
}

fn decode_record(id: &str, body: Option<Vec<u8>>) -> Result<ServiceRecord, SkippedRecord> {
    let Some(body) = body else {
        return Err(SkippedRecord {
            id: id.to_string(),
            reason: SkipReason::Missing,
            detail: None,
        });
    };

    serde_json::from_slice(&body).map_err(|error| SkippedRecord {
        id: id.to_string(),
        reason: SkipReason::DecodeError,
        detail: Some(error.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CatalogError, ESTADO_ACTIVO, ESTADO_INACTIVO};
    use crate::memory::InMemoryCatalogStore;
    use crate::storage_keys::{last_sync_key, record_key};
    use crate::writer::{CatalogWriter, WriterOptions};

    fn record(id: &str, estado: &str) -> ServiceRecord {
        ServiceRecord {
            id: id.to_string(),
            categoria: None,
            proveedor: None,
            servicio: None,
            plan: None,
            precio_mensual: 5.0,
            detalles: None,
            estado: estado.to_string(),
        }
    }

    async fn seeded(records: &[ServiceRecord]) -> (Arc<InMemoryCatalogStore>, String) {
        let store = Arc::new(InMemoryCatalogStore::default());
        let summary = CatalogWriter::new(store.clone(), WriterOptions::default())
            .rebuild(records)
            .await
            .expect("rebuild should succeed");
        (store, summary.generation)
    }

    #[tokio::test]
    async fn never_synced_catalog_is_empty() {
        let store = Arc::new(InMemoryCatalogStore::default());
        let snapshot = CatalogReader::new(store)
            .get_active_catalog()
            .await
            .expect("read should succeed");

        assert_eq!(snapshot, CatalogSnapshot::empty(None, None));
    }

    #[tokio::test]
    async fn keeps_only_exact_activo_records_in_id_order() {
        let (store, _) = seeded(&[
            record("b", ESTADO_ACTIVO),
            record("a", ESTADO_ACTIVO),
            record("c", ESTADO_INACTIVO),
            record("d", "ACTIVO"),
        ])
        .await;

        let snapshot = CatalogReader::with_batch_size(store, 2)
            .get_active_catalog()
            .await
            .expect("read should succeed");

        let ids: Vec<_> = snapshot.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(snapshot.skipped.is_empty());
        assert!(snapshot.last_sync.is_some());
    }

    #[tokio::test]
    async fn missing_and_corrupt_records_are_reported_not_fatal() {
        let (store, generation) = seeded(&[
            record("1", ESTADO_ACTIVO),
            record("2", ESTADO_ACTIVO),
            record("3", ESTADO_ACTIVO),
        ])
        .await;
        store.remove(&record_key("catalog", &generation, "2"));
        store.put_raw(&record_key("catalog", &generation, "3"), b"{not json");

        let snapshot = CatalogReader::new(store)
            .get_active_catalog()
            .await
            .expect("read should succeed");

        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].id, "1");
        assert_eq!(snapshot.skipped.len(), 2);
        assert_eq!(snapshot.skipped[0].id, "2");
        assert_eq!(snapshot.skipped[0].reason, SkipReason::Missing);
        assert_eq!(snapshot.skipped[1].id, "3");
        assert_eq!(snapshot.skipped[1].reason, SkipReason::DecodeError);
    }

    #[tokio::test]
    async fn head_read_failure_propagates() {
        let (store, _) = seeded(&[record("1", ESTADO_ACTIVO)]).await;
        store.fail_reads(true);

        let error = CatalogReader::new(store)
            .get_active_catalog()
            .await
            .expect_err("read should fail");
        assert!(matches!(error, CatalogError::Connection(_)));
    }

    #[tokio::test]
    async fn last_sync_without_generation_reads_as_empty() {
        let store = Arc::new(InMemoryCatalogStore::default());
        store.put_raw(&last_sync_key("catalog"), b"2026-02-14T00:00:00.000Z");

        let snapshot = CatalogReader::new(store)
            .get_active_catalog()
            .await
            .expect("read should succeed");
        assert_eq!(
            snapshot.last_sync.as_deref(),
            Some("2026-02-14T00:00:00.000Z")
        );
        assert!(snapshot.items.is_empty());
    }

    #[tokio::test]
    async fn get_service_returns_inactive_records_too() {
        let (store, _) = seeded(&[record("7", ESTADO_INACTIVO)]).await;
        let reader = CatalogReader::new(store);

        let found = reader.get_service("7").await.expect("lookup should succeed");
        assert_eq!(found.map(|item| item.estado), Some(ESTADO_INACTIVO.to_string()));
        assert_eq!(reader.get_service("8").await.expect("lookup should succeed"), None);
    }
}
