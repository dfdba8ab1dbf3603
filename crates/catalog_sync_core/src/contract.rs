use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ESTADO_ACTIVO: &str = "Activo";
pub const ESTADO_INACTIVO: &str = "Inactivo";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proveedor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servicio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Monthly price. Values that could not be coerced are NaN and travel as
    /// JSON `null`.
    #[serde(with = "nullable_price", default = "missing_price")]
    pub precio_mensual: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detalles: Option<String>,
    #[serde(default = "default_estado")]
    pub estado: String,
}

impl ServiceRecord {
    pub fn is_active(&self) -> bool {
        self.estado == ESTADO_ACTIVO
    }
}

pub fn default_estado() -> String {
    ESTADO_ACTIVO.to_string()
}

fn missing_price() -> f64 {
    f64::NAN
}

mod nullable_price {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RebuildSummary {
    pub items_count: usize,
    pub last_sync: String,
    pub generation: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Missing,
    DecodeError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogSnapshot {
    pub last_sync: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    pub items: Vec<ServiceRecord>,
    #[serde(default)]
    pub skipped: Vec<SkippedRecord>,
}

impl CatalogSnapshot {
    pub fn empty(last_sync: Option<String>, generation: Option<String>) -> Self {
        Self {
            last_sync,
            generation,
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateResponse {
    pub items_count: usize,
    pub last_sync: String,
    pub archive_key: String,
    pub generation: String,
    pub source_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("credential retrieval failed: {0}")]
    Auth(String),

    #[error("store unreachable: {0}")]
    Connection(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store command failed: {0}")]
    Store(String),

    #[error("archive write failed: {0}")]
    Archive(String),

    #[error("rebuild superseded by a newer sync at {current_last_sync}")]
    Superseded { current_last_sync: String },
}

impl CatalogError {
    /// Stable machine-readable code used at the handler boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_error",
            Self::Connection(_) => "connection_error",
            Self::Validation(_) => "validation_error",
            Self::Store(_) => "store_error",
            Self::Archive(_) => "archive_error",
            Self::Superseded { .. } => "superseded",
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Fixed-width ISO-8601 UTC timestamp; lexicographic order equals time order.
pub fn format_sync_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn source_fingerprint(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_record() -> ServiceRecord {
        ServiceRecord {
            id: "1".to_string(),
            categoria: Some("Internet".to_string()),
            proveedor: Some("ProvA".to_string()),
            servicio: Some("Fiber".to_string()),
            plan: Some("Basic".to_string()),
            precio_mensual: 29.99,
            detalles: Some("Unlimited".to_string()),
            estado: ESTADO_ACTIVO.to_string(),
        }
    }

    #[test]
    fn nan_price_is_written_as_null_and_read_back_as_nan() {
        let record = ServiceRecord {
            precio_mensual: f64::NAN,
            ..sample_record()
        };

        let json = serde_json::to_value(&record).expect("record should serialize");
        assert!(json["precio_mensual"].is_null());

        let decoded: ServiceRecord =
            serde_json::from_value(json).expect("record should deserialize");
        assert!(decoded.precio_mensual.is_nan());
    }

    #[test]
    fn absent_optional_fields_are_omitted() {
        let record = ServiceRecord {
            categoria: None,
            detalles: None,
            ..sample_record()
        };

        let json = serde_json::to_value(&record).expect("record should serialize");
        assert!(json.get("categoria").is_none());
        assert!(json.get("detalles").is_none());
        assert_eq!(json["proveedor"], "ProvA");
    }

    #[test]
    fn estado_defaults_to_activo_when_missing_from_stored_json() {
        let decoded: ServiceRecord =
            serde_json::from_str(r#"{"id":"9","precio_mensual":10}"#).expect("should decode");
        assert!(decoded.is_active());
        assert_eq!(decoded.precio_mensual, 10.0);
    }

    #[test]
    fn active_match_is_case_sensitive() {
        let record = ServiceRecord {
            estado: "activo".to_string(),
            ..sample_record()
        };
        assert!(!record.is_active());
    }

    #[test]
    fn sync_timestamps_are_fixed_width() {
        let early = Utc.with_ymd_and_hms(2026, 2, 14, 9, 5, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 2, 14, 10, 0, 0).unwrap();

        let early_text = format_sync_timestamp(early);
        assert_eq!(early_text, "2026-02-14T09:05:00.000Z");
        assert!(early_text < format_sync_timestamp(late));
    }

    #[test]
    fn error_codes_are_distinct_per_kind() {
        let errors = [
            CatalogError::Auth("a".to_string()),
            CatalogError::Connection("c".to_string()),
            CatalogError::Validation(ValidationError::new("v")),
            CatalogError::Store("s".to_string()),
            CatalogError::Archive("o".to_string()),
            CatalogError::Superseded {
                current_last_sync: "t".to_string(),
            },
        ];
        let mut codes: Vec<_> = errors.iter().map(CatalogError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
