//! Dataset schema used by the validation stage.
//!
//! ```yaml
//! columns:
//!   - having_IP_Address: int64
//!   - URL_Length: int64
//!   - Result: int64
//! numerical_columns:
//!   - having_IP_Address
//!   - URL_Length
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::frame::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    /// One single-entry map per column: name -> declared type
    pub columns: Vec<BTreeMap<String, String>>,

    #[serde(default)]
    pub numerical_columns: Vec<String>,
}

impl DataSchema {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse schema file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let schema: Self = serde_yaml::from_str(content)?;
        if schema.columns.is_empty() {
            bail!("schema declares no columns");
        }
        Ok(schema)
    }

    /// Declared column names, in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .flat_map(|entry| entry.keys().map(String::as_str))
            .collect()
    }

    /// Check a frame against the schema; returns every problem found
    pub fn check(&self, frame: &Frame) -> Vec<String> {
        let mut problems = Vec::new();

        let expected = self.column_names();
        if frame.columns().len() != expected.len() {
            problems.push(format!(
                "expected {} columns, found {}",
                expected.len(),
                frame.columns().len()
            ));
        }
        for name in &expected {
            if frame.column_index(name).is_none() {
                problems.push(format!("missing column '{}'", name));
            }
        }
        for name in &self.numerical_columns {
            match frame.column_index(name) {
                None => problems.push(format!("missing numerical column '{}'", name)),
                Some(idx) if !frame.is_numeric_column(idx) => {
                    problems.push(format!("column '{}' is not numerical", name))
                }
                Some(_) => {}
            }
        }

        problems
    }
}
