// src/ingest.rs
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::AppError;
use crate::models::Record;

/// Decodes a JSON array of ledger rows.
pub fn parse_records(json: &str) -> Result<Vec<Record>, AppError> {
    let records: Vec<Record> = serde_json::from_str(json)?;
    Ok(records)
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>, AppError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let records = parse_records(&raw)?;
    info!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}
