use catalog_sync_core::{CatalogReader, CatalogStore};
use serde_json::{json, Value};

use crate::handlers::response::{
    catalog_error_response, error_response, success_response, ApiGatewayResponse,
};

/// Serves the active catalog, or a single service when the event carries
/// `pathParameters.id`.
pub async fn handle_get_event<S>(event: &Value, reader: &CatalogReader<S>) -> ApiGatewayResponse
where
    S: CatalogStore + ?Sized,
{
    if let Some(id) = requested_service_id(event) {
        return match reader.get_service(id).await {
            Ok(Some(service)) => success_response(200, service),
            Ok(None) => error_response(
                404,
                json!({
                    "error": "not_found",
                    "message": format!("Service '{id}' is not in the catalog"),
                }),
            ),
            Err(error) => catalog_error_response("catalog_get", &error),
        };
    }

    match reader.get_active_catalog().await {
        Ok(snapshot) => success_response(200, snapshot),
        Err(error) => catalog_error_response("catalog_get", &error),
    }
}

fn requested_service_id(event: &Value) -> Option<&str> {
    event
        .get("pathParameters")
        .and_then(|parameters| parameters.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
