//! Raw data loader: tabular CSV source to normalized records.
//!
//! The whole file is buffered in memory. Column types are inferred per
//! column the way a dataframe reader does it, so a column of integers stays
//! integral even if one cell is empty.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::{debug, info, instrument};

use crate::domain::Record;
use crate::error::PipelineError;

use super::frame::is_missing;

/// Inferred scalar type of a source column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

/// Read a CSV file with a header row into one record per data row.
#[instrument(fields(path = %path.display()))]
pub fn load_records(path: &Path) -> Result<Vec<Record>, PipelineError> {
    let source_err = |reason: String| PipelineError::SourceRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .map_err(|e| source_err(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| source_err(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(source_err("missing header row".to_string()));
    }
    let mut seen = HashSet::new();
    for header in &headers {
        if header.is_empty() {
            return Err(source_err("empty column name in header".to_string()));
        }
        if !seen.insert(header.as_str()) {
            return Err(source_err(format!("duplicate column '{}'", header)));
        }
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let row = result.map_err(|e| source_err(format!("row {}: {}", line + 1, e)))?;
        rows.push(row.iter().map(|c| c.trim().to_string()).collect());
    }

    let types: Vec<ColumnType> = (0..headers.len())
        .map(|col| infer_column_type(rows.iter().map(|r| r[col].as_str())))
        .collect();
    debug!(?types, "Inferred column types");

    let records: Vec<Record> = rows
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            let fields: Map<String, Value> = headers
                .iter()
                .zip(types.iter())
                .zip(row)
                .map(|((name, ty), cell)| (name.clone(), convert_cell(&cell, *ty)))
                .collect();
            Record::new(row_index, fields)
        })
        .collect();

    info!(rows = records.len(), columns = headers.len(), "Loaded source file");
    Ok(records)
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut ty = ColumnType::Integer;
    let mut any_value = false;

    for cell in cells.filter(|c| !is_missing(c)) {
        any_value = true;
        ty = match ty {
            ColumnType::Integer if cell.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Float if cell.parse::<f64>().is_ok() => {
                ColumnType::Float
            }
            ColumnType::Integer if parse_bool(cell).is_some() => ColumnType::Boolean,
            ColumnType::Boolean if parse_bool(cell).is_some() => ColumnType::Boolean,
            _ => return ColumnType::Text,
        };
    }

    if any_value {
        ty
    } else {
        ColumnType::Text
    }
}

fn convert_cell(cell: &str, ty: ColumnType) -> Value {
    if is_missing(cell) {
        return Value::Null;
    }
    match ty {
        ColumnType::Integer => cell
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(cell.to_string())),
        ColumnType::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnType::Boolean => parse_bool(cell)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::String(cell.to_string())),
        ColumnType::Text => Value::String(cell.to_string()),
    }
}
