//! Record parsing and shape validation.
//!
//! Validation is purely a filter with logging: a failing record is excluded
//! from every later stage and its error is collected for the report, but the
//! run never aborts here.
//!
//! ## Rules by declared kind
//! - `node`: pattern-constrained `id` plus string `title`
//! - `card`: non-empty string `id` plus string `name`
//! - `lineage`: non-empty string `id`

use crate::record::{id_pattern, RawRecord, SourceOrigin, SourceRecord};
use serde_json::Value;

/// A record that failed shape validation, kept for the report.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub origin: SourceOrigin,
    pub err: String,
}

/// Parse and validate every raw record, splitting the stream into valid
/// records and collected errors.
pub fn validate(records: Vec<RawRecord>) -> (Vec<SourceRecord>, Vec<ValidationError>) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    for record in records {
        match check_record(&record) {
            Ok(data) => valid.push(SourceRecord {
                origin: record.origin,
                raw: record.raw,
                data,
            }),
            Err(err) => {
                tracing::debug!(origin = %record.origin, "record rejected: {err}");
                errors.push(ValidationError {
                    origin: record.origin,
                    err,
                });
            }
        }
    }
    tracing::info!(valid = valid.len(), rejected = errors.len(), "validation complete");
    (valid, errors)
}

fn check_record(record: &RawRecord) -> Result<Value, String> {
    let data: Value =
        serde_json::from_str(&record.raw).map_err(|err| format!("invalid JSON: {err}"))?;
    if !data.is_object() {
        return Err("top level is not an object".to_string());
    }
    let id = match data.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id,
        Some(_) => return Err("id is empty".to_string()),
        None => return Err("missing string id".to_string()),
    };

    let kind = data.get("kind").and_then(Value::as_str).unwrap_or("node");
    match kind {
        "node" => {
            if !id_pattern().is_match(id) {
                return Err(format!("id {id:?} does not match the identifier pattern"));
            }
            if data.get("title").and_then(Value::as_str).is_none() {
                return Err("node record missing string title".to_string());
            }
        }
        "card" => {
            if data.get("name").and_then(Value::as_str).is_none() {
                return Err("card record missing string name".to_string());
            }
        }
        "lineage" => {}
        other => return Err(format!("unknown record kind {other:?}")),
    }
    Ok(data)
}
