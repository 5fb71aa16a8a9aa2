//! Serialized model: the fitted preprocessor plus the classifier.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::classifier::LogisticRegression;
use super::imputer::KnnImputer;
use crate::data::{write_atomic, Frame};

/// Everything needed to score raw validated rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub feature_columns: Vec<String>,
    pub target_column: String,
    pub preprocessor: KnnImputer,
    pub classifier: LogisticRegression,
}

impl ModelBundle {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read model: {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse model: {}", path.display()))
    }

    /// Impute and classify every row of a frame with the feature columns
    pub fn predict_frame(&self, frame: &Frame) -> Result<Vec<f64>> {
        let indices = self.feature_indices(frame)?;
        let raw = frame.numeric_matrix(&indices)?;
        let filled = self.preprocessor.transform(&raw)?;
        self.classifier.predict(&filled)
    }

    /// Target column of a frame, which must be complete
    pub fn targets(&self, frame: &Frame) -> Result<Vec<f64>> {
        let index = frame
            .column_index(&self.target_column)
            .with_context(|| format!("target column '{}' missing", self.target_column))?;
        frame
            .numeric_column(index)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| v.with_context(|| format!("target missing at row {}", row)))
            .collect()
    }

    fn feature_indices(&self, frame: &Frame) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(self.feature_columns.len());
        for column in &self.feature_columns {
            match frame.column_index(column) {
                Some(i) => indices.push(i),
                None => bail!("feature column '{}' missing from input", column),
            }
        }
        Ok(indices)
    }
}
