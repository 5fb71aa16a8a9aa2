//! Model training: fit the classifier and gate it on score and overfitting.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::config::ModelSettings;
use crate::core::{RunContext, Stage};
use crate::data::Frame;
use crate::domain::{ClassificationMetric, DataTransformationArtifact, ModelTrainerArtifact};
use crate::ml::{classification_score, KnnImputer, LogisticRegression, ModelBundle, TrainParams};

use super::blocking;

pub struct ModelTrainer {
    target_column: String,
    settings: ModelSettings,
}

impl ModelTrainer {
    pub fn new(target_column: &str, settings: ModelSettings) -> Self {
        Self {
            target_column: target_column.to_string(),
            settings,
        }
    }
}

/// Complete numeric features and targets from a transformed table
fn load_xy(path: &Path, features: &[String], target: &str) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let frame = Frame::read_csv(path)?;
    let mut indices = Vec::with_capacity(features.len());
    for column in features {
        let i = frame
            .column_index(column)
            .with_context(|| format!("feature column '{}' missing from {}", column, path.display()))?;
        indices.push(i);
    }
    let target_index = frame
        .column_index(target)
        .with_context(|| format!("target column '{}' missing from {}", target, path.display()))?;

    let x = frame
        .numeric_matrix(&indices)?
        .into_iter()
        .enumerate()
        .map(|(row, values)| {
            values
                .into_iter()
                .collect::<Option<Vec<f64>>>()
                .with_context(|| format!("row {} still has missing features", row))
        })
        .collect::<Result<Vec<_>>>()?;
    let y = frame
        .numeric_column(target_index)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.with_context(|| format!("target value missing at row {}", row)))
        .collect::<Result<Vec<_>>>()?;

    Ok((x, y))
}

/// Reject models below the expected score or with a large train/test gap
pub fn check_fit(
    train: &ClassificationMetric,
    test: &ClassificationMetric,
    settings: &ModelSettings,
) -> Result<()> {
    if test.f1_score < settings.expected_score {
        bail!(
            "trained model f1 {:.4} is below the expected score {:.4}",
            test.f1_score,
            settings.expected_score
        );
    }
    let gap = (train.f1_score - test.f1_score).abs();
    if gap > settings.overfitting_threshold {
        bail!(
            "train/test f1 gap {:.4} exceeds the overfitting threshold {:.4}",
            gap,
            settings.overfitting_threshold
        );
    }
    Ok(())
}

#[async_trait]
impl Stage for ModelTrainer {
    type Input = DataTransformationArtifact;
    type Output = ModelTrainerArtifact;

    #[instrument(skip_all)]
    async fn run(
        &self,
        ctx: &RunContext,
        input: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact> {
        let input = input.clone();
        let target = self.target_column.clone();
        let settings = self.settings.clone();
        let model_path = ctx.layout.trained_model_file();

        blocking(move || {
            let content = std::fs::read(&input.transformed_object_file_path).with_context(|| {
                format!(
                    "Failed to read preprocessor: {}",
                    input.transformed_object_file_path.display()
                )
            })?;
            let preprocessor: KnnImputer =
                serde_json::from_slice(&content).context("Failed to parse preprocessor")?;
            let features = preprocessor.feature_columns.clone();

            let (train_x, train_y) = load_xy(&input.transformed_train_file_path, &features, &target)?;
            let (test_x, test_y) = load_xy(&input.transformed_test_file_path, &features, &target)?;

            let classifier = LogisticRegression::fit(
                &train_x,
                &train_y,
                TrainParams {
                    epochs: settings.epochs,
                    learning_rate: settings.learning_rate,
                    l2: settings.l2,
                },
            )?;
            let positive = classifier.positive_class();

            let train_metric =
                classification_score(&train_y, &classifier.predict(&train_x)?, positive);
            let test_metric = classification_score(&test_y, &classifier.predict(&test_x)?, positive);
            info!(
                train_f1 = train_metric.f1_score,
                test_f1 = test_metric.f1_score,
                "Model fitted"
            );
            check_fit(&train_metric, &test_metric, &settings)?;

            let bundle = ModelBundle {
                feature_columns: features,
                target_column: target,
                preprocessor,
                classifier,
            };
            bundle.save(&model_path)?;

            Ok(ModelTrainerArtifact {
                trained_model_file_path: model_path,
                train_metric_artifact: train_metric,
                test_metric_artifact: test_metric,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(f1: f64) -> ClassificationMetric {
        ClassificationMetric {
            f1_score: f1,
            precision_score: f1,
            recall_score: f1,
        }
    }

    #[test]
    fn test_check_fit_gates() {
        let settings = ModelSettings::default();

        assert!(check_fit(&metric(0.95), &metric(0.93), &settings).is_ok());

        let err = check_fit(&metric(0.5), &metric(0.5), &settings).unwrap_err();
        assert!(err.to_string().contains("expected score"));

        let err = check_fit(&metric(1.0), &metric(0.8), &settings).unwrap_err();
        assert!(err.to_string().contains("overfitting"));
    }
}
