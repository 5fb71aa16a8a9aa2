//! Normalized source rows.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schema-flexible document as stored in the document store
pub type Document = Map<String, Value>;

/// One row of the tabular source, keyed by column header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 0-based position of the row in the source (header excluded)
    pub row_index: usize,

    /// Column name to scalar value, in header order
    pub fields: Document,
}

impl Record {
    pub fn new(row_index: usize, fields: Document) -> Self {
        Self { row_index, fields }
    }

    /// The document body to insert; the row index is not stored
    pub fn into_document(self) -> Document {
        self.fields
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}
