use catalog_sync_core::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// Unwraps an API Gateway proxy event into its JSON payload. Events without a
/// `body` are treated as the payload themselves.
pub fn normalize_apigw_event(event: Value) -> Result<Value, String> {
    let Some(object) = event.as_object() else {
        return Err("Request payload must be a JSON object".to_string());
    };

    let Some(body) = object.get("body") else {
        return Ok(event);
    };

    match body {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(body.clone()),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|error| format!("Malformed JSON body: {error}"))
        }
        _ => Err("Request body must be a JSON object".to_string()),
    }
}

pub fn validation_error_response(message: &str) -> ApiGatewayResponse {
    error_response(
        400,
        json!({
            "error": "validation_error",
            "message": message,
        }),
    )
}

pub fn success_response(status_code: u16, payload: impl Serialize) -> ApiGatewayResponse {
    match serde_json::to_string(&payload) {
        Ok(body) => ApiGatewayResponse {
            status_code,
            headers: json!({"content-type": "application/json"}),
            body,
        },
        Err(error) => error_response(
            500,
            json!({
                "error": "serialization_error",
                "message": error.to_string(),
            }),
        ),
    }
}

pub fn error_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"content-type": "application/json"}),
        body: payload.to_string(),
    }
}

/// Maps a failure to its response. Client-caused failures carry their message;
/// everything else is logged and answered with a generic message.
pub fn catalog_error_response(component: &str, failure: &CatalogError) -> ApiGatewayResponse {
    match failure {
        CatalogError::Validation(validation) => validation_error_response(validation.message()),
        CatalogError::Superseded { current_last_sync } => error_response(
            409,
            json!({
                "error": failure.code(),
                "message": "A newer catalog sync has already been applied",
                "last_sync": current_last_sync,
            }),
        ),
        _ => {
            error!(
                component = component,
                event = "request_failed",
                error_code = failure.code(),
                error = %failure,
            );
            error_response(
                500,
                json!({
                    "error": failure.code(),
                    "message": "Internal error",
                }),
            )
        }
    }
}
