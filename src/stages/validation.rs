//! Data validation: schema checks and dataset drift between train and test.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::DataSettings;
use crate::core::layout::{TEST_FILE_NAME, TRAIN_FILE_NAME};
use crate::core::{RunContext, Stage};
use crate::data::{write_atomic, DataSchema, Frame};
use crate::domain::{DataIngestionArtifact, DataValidationArtifact};
use crate::ml::ks_2samp;

use super::blocking;

/// Per-column drift verdict, as written to the drift report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    pub drift_status: bool,
}

pub struct DataValidation {
    schema_path: Option<PathBuf>,
    p_value_threshold: f64,
}

impl DataValidation {
    pub fn new(settings: &DataSettings) -> Self {
        Self {
            schema_path: settings.schema_path.clone(),
            p_value_threshold: settings.drift_p_value_threshold,
        }
    }
}

#[async_trait]
impl Stage for DataValidation {
    type Input = DataIngestionArtifact;
    type Output = DataValidationArtifact;

    #[instrument(skip_all)]
    async fn run(
        &self,
        ctx: &RunContext,
        input: &DataIngestionArtifact,
    ) -> Result<DataValidationArtifact> {
        let input = input.clone();
        let schema_path = self.schema_path.clone();
        let threshold = self.p_value_threshold;
        let layout = ctx.layout.clone();

        blocking(move || {
            let train = Frame::read_csv(&input.trained_file_path)?;
            let test = Frame::read_csv(&input.test_file_path)?;

            if let Some(path) = schema_path {
                let schema = DataSchema::from_file(&path)?;
                check_schema(&schema, &train, "train")?;
                check_schema(&schema, &test, "test")?;
            }
            if train.columns() != test.columns() {
                bail!(
                    "train and test columns differ: {:?} vs {:?}",
                    train.columns(),
                    test.columns()
                );
            }

            let report = detect_drift(&train, &test, threshold)?;
            let drifted: Vec<&str> = report
                .iter()
                .filter(|(_, d)| d.drift_status)
                .map(|(c, _)| c.as_str())
                .collect();
            let status = drifted.is_empty();

            let drift_report_file_path = layout.drift_report_file();
            let yaml = serde_yaml::to_string(&report).context("Failed to serialize drift report")?;
            write_atomic(&drift_report_file_path, yaml.as_bytes())?;

            let dir = if status {
                layout.validated_dir()
            } else {
                warn!(columns = ?drifted, "Dataset drift detected");
                layout.invalid_dir()
            };
            let train_file_path = dir.join(TRAIN_FILE_NAME);
            let test_file_path = dir.join(TEST_FILE_NAME);
            copy_atomic(&input.trained_file_path, &train_file_path)?;
            copy_atomic(&input.test_file_path, &test_file_path)?;

            info!(validation_status = status, "Validation finished");
            Ok(DataValidationArtifact {
                validation_status: status,
                train_file_path,
                test_file_path,
                drift_report_file_path,
            })
        })
        .await
    }
}

fn check_schema(schema: &DataSchema, frame: &Frame, split: &str) -> Result<()> {
    let problems = schema.check(frame);
    if !problems.is_empty() {
        bail!("{} split does not match schema: {}", split, problems.join("; "));
    }
    Ok(())
}

/// KS test on every column that is numeric in both splits
pub fn detect_drift(
    train: &Frame,
    test: &Frame,
    p_value_threshold: f64,
) -> Result<BTreeMap<String, ColumnDrift>> {
    let mut report = BTreeMap::new();

    for (i, column) in train.columns().iter().enumerate() {
        let Some(j) = test.column_index(column) else {
            continue;
        };
        if !train.is_numeric_column(i) || !test.is_numeric_column(j) {
            continue;
        }

        let a: Vec<f64> = train.numeric_column(i)?.into_iter().flatten().collect();
        let b: Vec<f64> = test.numeric_column(j)?.into_iter().flatten().collect();
        let result = ks_2samp(&a, &b);

        report.insert(
            column.clone(),
            ColumnDrift {
                p_value: result.p_value,
                drift_status: result.p_value < p_value_threshold,
            },
        );
    }

    Ok(report)
}

fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let bytes =
        std::fs::read(from).with_context(|| format!("Failed to read {}", from.display()))?;
    write_atomic(to, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(values: &[f64]) -> Frame {
        Frame::new(
            vec!["x".to_string(), "name".to_string()],
            values
                .iter()
                .map(|v| vec![v.to_string(), "n".to_string()])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_drift_between_similar_samples() {
        let values: Vec<f64> = (0..40).map(|i| (i % 5) as f64).collect();
        let report = detect_drift(&frame(&values), &frame(&values), 0.05).unwrap();

        assert_eq!(report.len(), 1, "text column is skipped");
        assert!(!report["x"].drift_status);
    }

    #[test]
    fn test_drift_between_shifted_samples() {
        let a: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..60).map(|i| 500.0 + i as f64).collect();
        let report = detect_drift(&frame(&a), &frame(&b), 0.05).unwrap();

        assert!(report["x"].drift_status);
        assert!(report["x"].p_value < 0.05);
    }
}
