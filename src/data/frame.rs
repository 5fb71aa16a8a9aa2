//! In-memory table read from and written to stage CSV files.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::domain::Document;

/// Cell values that count as missing, compared case-insensitively
const MISSING_MARKERS: [&str; 5] = ["", "na", "n/a", "nan", "null"];

/// Whether a raw cell is a missing-value marker
pub fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    MISSING_MARKERS
        .iter()
        .any(|m| trimmed.eq_ignore_ascii_case(m))
}

/// A rectangular table of string cells with a header
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    /// Build a frame, rejecting rows whose width differs from the header
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            bail!(
                "row {} has {} cells but the header has {} columns",
                i,
                row.len(),
                columns.len()
            );
        }
        Ok(Self { columns, rows })
    }

    /// Flatten documents into a table.
    ///
    /// Columns are the union of document keys in first-seen order, minus
    /// `excluded`. Nested values are kept as compact JSON.
    pub fn from_documents(documents: &[Document], excluded: &[&str]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for doc in documents {
            for key in doc.keys() {
                if !excluded.contains(&key.as_str()) && !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = documents
            .iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|c| doc.get(c).map(cell_from_value).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let columns = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Self::new(columns, rows)
    }

    /// Write the frame as CSV.
    ///
    /// The file is staged next to its destination and renamed into place,
    /// so a reader never sees a half-written table.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut buffer = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut buffer);
            writer.write_record(&self.columns)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        write_atomic(path, &buffer)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// New frame holding the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Parse one column as numbers; missing markers become `None`
    pub fn numeric_column(&self, index: usize) -> Result<Vec<Option<f64>>> {
        let name = &self.columns[index];
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                parse_numeric(&cells[index]).with_context(|| {
                    format!("column '{}' row {}: '{}' is not numeric", name, row, cells[index])
                })
            })
            .collect()
    }

    /// Whether every present cell of a column parses as a number
    pub fn is_numeric_column(&self, index: usize) -> bool {
        self.rows
            .iter()
            .all(|cells| parse_numeric(&cells[index]).is_ok())
    }

    /// Row-major numeric matrix over the given columns
    pub fn numeric_matrix(&self, indices: &[usize]) -> Result<Vec<Vec<Option<f64>>>> {
        let columns: Vec<Vec<Option<f64>>> = indices
            .iter()
            .map(|&i| self.numeric_column(i))
            .collect::<Result<_>>()?;

        Ok((0..self.rows.len())
            .map(|row| columns.iter().map(|col| col[row]).collect())
            .collect())
    }
}

fn parse_numeric(cell: &str) -> Result<Option<f64>> {
    if is_missing(cell) {
        return Ok(None);
    }
    let value: f64 = cell.trim().parse()?;
    Ok(Some(value))
}

fn cell_from_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.eq_ignore_ascii_case("na") => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Write bytes to `path` through a temp file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage file in {}", dir.display()))?;
    staged.write_all(bytes)?;
    staged.flush()?;
    staged
        .persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_from_documents_drops_id_and_marks_na() {
        let docs = vec![
            doc(json!({"_id": {"$oid": "abc"}, "a": 1, "b": "na", "Result": -1})),
            doc(json!({"_id": {"$oid": "def"}, "a": 2.5, "b": 3, "Result": 1})),
        ];
        let frame = Frame::from_documents(&docs, &["_id"]);

        assert_eq!(frame.columns(), &["a", "b", "Result"]);
        assert_eq!(frame.rows()[0], vec!["1", "", "-1"]);
        assert_eq!(frame.rows()[1], vec!["2.5", "3", "1"]);
    }

    #[test]
    fn test_csv_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("train.csv");
        let frame = Frame::new(
            vec!["x".to_string(), "y".to_string()],
            vec![
                vec!["1".to_string(), "a,b".to_string()],
                vec!["".to_string(), "c".to_string()],
            ],
        )
        .unwrap();

        frame.write_csv(&path).unwrap();
        let back = Frame::read_csv(&path).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_numeric_column_handles_missing_markers() {
        let frame = Frame::new(
            vec!["x".to_string()],
            vec![
                vec!["1".to_string()],
                vec!["NaN".to_string()],
                vec!["na".to_string()],
                vec!["-2.5".to_string()],
            ],
        )
        .unwrap();

        assert_eq!(
            frame.numeric_column(0).unwrap(),
            vec![Some(1.0), None, None, Some(-2.5)]
        );
        assert!(frame.is_numeric_column(0));
    }

    #[test]
    fn test_non_numeric_column_errors() {
        let frame = Frame::new(
            vec!["x".to_string()],
            vec![vec!["phish".to_string()]],
        )
        .unwrap();
        assert!(!frame.is_numeric_column(0));
        assert!(frame.numeric_column(0).is_err());
    }

    #[test]
    fn test_ragged_frame_rejected() {
        let result = Frame::new(vec!["x".to_string()], vec![vec![]]);
        assert!(result.is_err());
    }
}
