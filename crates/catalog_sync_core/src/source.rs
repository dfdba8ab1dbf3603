//! Mapping from tabular source rows to [`ServiceRecord`]s.
//!
//! No schema validation happens here: missing columns become missing fields,
//! unparseable prices become NaN, and every row is kept.

use std::collections::BTreeMap;

use csv::{ReaderBuilder, Trim};

use crate::contract::{default_estado, ServiceRecord, ValidationError};

pub type SourceRow = BTreeMap<String, String>;

pub fn parse_catalog_csv(body: &[u8]) -> Result<Vec<ServiceRecord>, ValidationError> {
    parse_source_rows(body).map(|rows| rows.iter().map(map_row).collect())
}

pub fn parse_source_rows(body: &[u8]) -> Result<Vec<SourceRow>, ValidationError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|error| ValidationError::new(format!("Malformed CSV header: {error}")))?
        .clone();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|error| {
            ValidationError::new(format!("Malformed CSV row {}: {error}", index + 1))
        })?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

pub fn map_row(row: &SourceRow) -> ServiceRecord {
    let text = |column: &str| row.get(column).cloned();

    ServiceRecord {
        id: row
            .get("id")
            .map(|value| value.trim().to_string())
            .unwrap_or_default(),
        categoria: text("categoria"),
        proveedor: text("proveedor"),
        servicio: text("servicio"),
        plan: text("plan"),
        precio_mensual: coerce_price(row.get("precio_mensual").map(String::as_str)),
        detalles: text("detalles"),
        estado: row
            .get("estado")
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(default_estado),
    }
}

/// Absent or non-numeric prices coerce to NaN; a blank cell coerces to zero.
pub fn coerce_price(raw: Option<&str>) -> f64 {
    match raw.map(str::trim) {
        None => f64::NAN,
        Some("") => 0.0,
        Some(value) => value.parse::<f64>().unwrap_or(f64::NAN),
    }
}
