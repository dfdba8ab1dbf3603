use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use catalog_sync_core::contract::{format_sync_timestamp, source_fingerprint, UpdateResponse};
use catalog_sync_core::source::parse_catalog_csv;
use catalog_sync_core::storage_keys::archive_object_key;
use catalog_sync_core::{CatalogResult, CatalogStore, CatalogWriter, ValidationError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::adapters::object_store::ArchiveStore;
use crate::handlers::response::{
    catalog_error_response, normalize_apigw_event, success_response, validation_error_response,
    ApiGatewayResponse,
};

#[derive(Debug, Default, Deserialize)]
struct UpdatePayload {
    #[serde(rename = "csvBase64", default)]
    csv_base64: Option<String>,
    #[serde(rename = "csvText", default)]
    csv_text: Option<String>,
}

pub async fn handle_update_event<S, A>(
    event: Value,
    writer: &CatalogWriter<S>,
    archive: &A,
    archive_prefix: &str,
) -> ApiGatewayResponse
where
    S: CatalogStore + ?Sized,
    A: ArchiveStore + ?Sized,
{
    handle_update_event_at(event, writer, archive, archive_prefix, Utc::now()).await
}

pub async fn handle_update_event_at<S, A>(
    event: Value,
    writer: &CatalogWriter<S>,
    archive: &A,
    archive_prefix: &str,
    now: DateTime<Utc>,
) -> ApiGatewayResponse
where
    S: CatalogStore + ?Sized,
    A: ArchiveStore + ?Sized,
{
    let payload = match normalize_update_payload(event) {
        Ok(value) => value,
        Err(error) => return validation_error_response(error.message()),
    };

    match run_update(&payload, writer, archive, archive_prefix, now).await {
        Ok(response) => success_response(200, response),
        Err(error) => catalog_error_response("catalog_update", &error),
    }
}

fn normalize_update_payload(event: Value) -> Result<Vec<u8>, ValidationError> {
    let payload = normalize_apigw_event(event).map_err(ValidationError::new)?;
    let payload: UpdatePayload = serde_json::from_value(payload)
        .map_err(|error| ValidationError::new(format!("Malformed request: {error}")))?;

    let csv_base64 = payload.csv_base64.filter(|value| !value.is_empty());
    let csv_text = payload.csv_text.filter(|value| !value.is_empty());
    match (csv_base64, csv_text) {
        (Some(encoded), _) => STANDARD.decode(encoded.trim()).map_err(|error| {
            ValidationError::new(format!("csvBase64 is not valid base64: {error}"))
        }),
        (None, Some(text)) => Ok(text.into_bytes()),
        (None, None) => Err(ValidationError::new("Body must include csvBase64 or csvText")),
    }
}

async fn run_update<S, A>(
    body: &[u8],
    writer: &CatalogWriter<S>,
    archive: &A,
    archive_prefix: &str,
    now: DateTime<Utc>,
) -> CatalogResult<UpdateResponse>
where
    S: CatalogStore + ?Sized,
    A: ArchiveStore + ?Sized,
{
    let started_at = Instant::now();
    let last_sync = format_sync_timestamp(now);
    let archive_key = archive_object_key(archive_prefix, &last_sync);
    let source_sha256 = source_fingerprint(body);

    archive.write_archive(&archive_key, body, &source_sha256).await?;
    info!(
        component = "catalog_update",
        event = "source_archived",
        archive_key = %archive_key,
        bytes = body.len(),
        source_sha256 = %source_sha256,
    );

    let records = parse_catalog_csv(body)?;
    let summary = writer.rebuild_at(&records, now).await?;

    info!(
        component = "catalog_update",
        event = "catalog_updated",
        items_count = summary.items_count,
        generation = %summary.generation,
        duration_ms = started_at.elapsed().as_millis() as u64,
    );

    Ok(UpdateResponse {
        items_count: summary.items_count,
        last_sync: summary.last_sync,
        archive_key,
        generation: summary.generation,
        source_sha256,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use catalog_sync_core::memory::InMemoryCatalogStore;
    use catalog_sync_core::{CatalogError, WriterOptions};
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    const SAMPLE_CSV: &str = "id,categoria,proveedor,servicio,plan,precio_mensual,detalles,estado\n\
1,Internet,ProvA,Fiber,Basic,29.99,Unlimited,Activo\n\
2,TV,ProvB,Cable,Premium,49.50,\"200 channels\",Inactivo\n";

    struct RecordingArchive {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
        fail: bool,
    }

    impl RecordingArchive {
        fn new() -> Self {
            Self {
                objects: Mutex::new(BTreeMap::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn objects(&self) -> BTreeMap<String, Vec<u8>> {
            self.objects.lock().expect("poisoned mutex").clone()
        }
    }

    #[async_trait]
    impl ArchiveStore for RecordingArchive {
        async fn write_archive(
            &self,
            key: &str,
            body: &[u8],
            _source_sha256: &str,
        ) -> CatalogResult<()> {
            if self.fail {
                return Err(CatalogError::Archive(format!(
                    "simulated write failure for key: {key}"
                )));
            }
            self.objects
                .lock()
                .expect("poisoned mutex")
                .insert(key.to_string(), body.to_vec());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 8, 30, 0).unwrap()
    }

    fn writer(store: &Arc<InMemoryCatalogStore>) -> CatalogWriter<InMemoryCatalogStore> {
        CatalogWriter::new(store.clone(), WriterOptions::default())
    }

    #[tokio::test]
    async fn archives_then_rebuilds_from_csv_text() {
        let store = Arc::new(InMemoryCatalogStore::default());
        let archive = RecordingArchive::new();

        let response = handle_update_event_at(
            json!({"body": json!({"csvText": SAMPLE_CSV}).to_string()}),
            &writer(&store),
            &archive,
            "catalog",
            now(),
        )
        .await;

        assert_eq!(response.status_code, 200);
        let body: UpdateResponse =
            serde_json::from_str(&response.body).expect("response should parse");
        assert_eq!(body.items_count, 2);
        assert_eq!(body.last_sync, "2026-02-14T08:30:00.000Z");
        assert_eq!(body.archive_key, "catalog/2026-02-14T08:30:00.000Z.csv");
        assert_eq!(body.source_sha256, source_fingerprint(SAMPLE_CSV.as_bytes()));

        assert_eq!(
            archive.objects().get(&body.archive_key).map(Vec::as_slice),
            Some(SAMPLE_CSV.as_bytes())
        );
        assert_eq!(store.current_generation(), Some(body.generation));
        assert_eq!(store.current_membership().len(), 2);
    }

    #[tokio::test]
    async fn decodes_base64_payloads_unmodified() {
        let store = Arc::new(InMemoryCatalogStore::default());
        let archive = RecordingArchive::new();
        let encoded = STANDARD.encode(SAMPLE_CSV.as_bytes());

        let response = handle_update_event_at(
            json!({"body": {"csvBase64": encoded, "csvText": "ignored"}}),
            &writer(&store),
            &archive,
            "catalog",
            now(),
        )
        .await;

        assert_eq!(response.status_code, 200);
        let archived = archive.objects();
        assert_eq!(archived.len(), 1);
        assert_eq!(
            archived.values().next().map(Vec::as_slice),
            Some(SAMPLE_CSV.as_bytes())
        );
    }

    #[tokio::test]
    async fn rejects_payload_without_csv() {
        let store = Arc::new(InMemoryCatalogStore::default());
        let archive = RecordingArchive::new();

        let response = handle_update_event_at(
            json!({"body": "{\"csvText\":\"\"}"}),
            &writer(&store),
            &archive,
            "catalog",
            now(),
        )
        .await;

        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.json_body()["message"],
            "Body must include csvBase64 or csvText"
        );
        assert!(archive.objects().is_empty());
        assert_eq!(store.round_trips(), 0);
    }

    #[tokio::test]
    async fn rejects_invalid_base64() {
        let store = Arc::new(InMemoryCatalogStore::default());
        let response = handle_update_event_at(
            json!({"body": {"csvBase64": "%%%"}}),
            &writer(&store),
            &RecordingArchive::new(),
            "catalog",
            now(),
        )
        .await;

        assert_eq!(response.status_code, 400);
        assert_eq!(response.json_body()["error"], "validation_error");
    }

    #[tokio::test]
    async fn archive_failure_stops_before_touching_the_store() {
        let store = Arc::new(InMemoryCatalogStore::default());
        let response = handle_update_event_at(
            json!({"body": {"csvText": SAMPLE_CSV}}),
            &writer(&store),
            &RecordingArchive::failing(),
            "catalog",
            now(),
        )
        .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.json_body()["error"], "archive_error");
        assert_eq!(store.round_trips(), 0);
    }

    #[tokio::test]
    async fn store_failure_is_reported_with_its_kind() {
        let store = Arc::new(InMemoryCatalogStore::default());
        store.fail_stage_call(0);

        let response = handle_update_event_at(
            json!({"body": {"csvText": SAMPLE_CSV}}),
            &writer(&store),
            &RecordingArchive::new(),
            "catalog",
            now(),
        )
        .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.json_body()["error"], "store_error");
        assert_eq!(response.json_body()["message"], "Internal error");
        assert_eq!(store.current_generation(), None);
    }
}
