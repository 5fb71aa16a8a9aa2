//! Data transformation: KNN-impute the features and persist the imputer.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::config::DataSettings;
use crate::core::layout::{TEST_FILE_NAME, TRAIN_FILE_NAME};
use crate::core::{RunContext, Stage};
use crate::data::{write_atomic, Frame};
use crate::domain::{DataTransformationArtifact, DataValidationArtifact};
use crate::ml::KnnImputer;

use super::blocking;

pub struct DataTransformation {
    target_column: String,
    n_neighbors: usize,
}

impl DataTransformation {
    pub fn new(settings: &DataSettings) -> Self {
        Self {
            target_column: settings.target_column.clone(),
            n_neighbors: settings.knn_neighbors,
        }
    }
}

/// Feature column names and indices, plus the target index
struct Split {
    features: Vec<String>,
    feature_indices: Vec<usize>,
    target_index: usize,
}

fn split_columns(frame: &Frame, target: &str) -> Result<Split> {
    let target_index = frame
        .column_index(target)
        .with_context(|| format!("target column '{}' missing", target))?;
    let (features, feature_indices): (Vec<String>, Vec<usize>) = frame
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != target_index)
        .map(|(i, c)| (c.clone(), i))
        .unzip();
    if features.is_empty() {
        bail!("no feature columns besides '{}'", target);
    }
    Ok(Split {
        features,
        feature_indices,
        target_index,
    })
}

fn complete_targets(frame: &Frame, index: usize) -> Result<Vec<f64>> {
    frame
        .numeric_column(index)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.with_context(|| format!("target value missing at row {}", row)))
        .collect()
}

/// Imputed features followed by the target, as a table
fn transformed_frame(
    features: &[String],
    target: &str,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<Frame> {
    let mut columns = features.to_vec();
    columns.push(target.to_string());
    let rows = x
        .iter()
        .zip(y)
        .map(|(row, label)| {
            row.iter()
                .chain(std::iter::once(label))
                .map(|v| v.to_string())
                .collect()
        })
        .collect();
    Frame::new(columns, rows)
}

#[async_trait]
impl Stage for DataTransformation {
    type Input = DataValidationArtifact;
    type Output = DataTransformationArtifact;

    #[instrument(skip_all)]
    async fn run(
        &self,
        ctx: &RunContext,
        input: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact> {
        let input = input.clone();
        let target = self.target_column.clone();
        let k = self.n_neighbors;
        let layout = ctx.layout.clone();

        blocking(move || {
            let train = Frame::read_csv(&input.train_file_path)?;
            let test = Frame::read_csv(&input.test_file_path)?;

            let train_cols = split_columns(&train, &target).context("train split")?;
            let test_cols = split_columns(&test, &target).context("test split")?;
            if train_cols.features != test_cols.features {
                bail!("train and test feature columns differ");
            }

            let train_x = train.numeric_matrix(&train_cols.feature_indices)?;
            let test_x = test.numeric_matrix(&test_cols.feature_indices)?;
            let train_y = complete_targets(&train, train_cols.target_index)?;
            let test_y = complete_targets(&test, test_cols.target_index)?;

            let imputer = KnnImputer::fit(k, train_cols.features.clone(), &train_x)?;
            let train_filled = imputer.transform(&train_x)?;
            let test_filled = imputer.transform(&test_x)?;

            let artifact = DataTransformationArtifact {
                transformed_object_file_path: layout.preprocessor_file(),
                transformed_train_file_path: layout.transformed_dir().join(TRAIN_FILE_NAME),
                transformed_test_file_path: layout.transformed_dir().join(TEST_FILE_NAME),
            };

            transformed_frame(&train_cols.features, &target, &train_filled, &train_y)?
                .write_csv(&artifact.transformed_train_file_path)?;
            transformed_frame(&test_cols.features, &target, &test_filled, &test_y)?
                .write_csv(&artifact.transformed_test_file_path)?;

            let json = serde_json::to_vec_pretty(&imputer).context("Failed to serialize imputer")?;
            write_atomic(&artifact.transformed_object_file_path, &json)?;

            info!(
                features = train_cols.features.len(),
                neighbors = k,
                "Imputed train and test features"
            );
            Ok(artifact)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactLayout;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn write(path: &std::path::Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_imputes_and_moves_target_last() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().join("run"), temp.path().join("models"));
        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            layout: layout.clone(),
        };

        let train = temp.path().join("train.csv");
        let test = temp.path().join("test.csv");
        write(&train, "Result,a,b\n1,1,10\n1,1,\n-1,5,50\n");
        write(&test, "Result,a,b\n-1,,50\n");

        let input = DataValidationArtifact {
            validation_status: true,
            train_file_path: train,
            test_file_path: test,
            drift_report_file_path: temp.path().join("report.yaml"),
        };
        let stage = DataTransformation::new(&DataSettings::default());
        let artifact = stage.run(&ctx, &input).await.unwrap();

        let out = Frame::read_csv(&artifact.transformed_train_file_path).unwrap();
        assert_eq!(out.columns(), &["a", "b", "Result"]);
        // Only two donors have b: mean of 10 and 50
        assert_eq!(out.rows()[1], vec!["1", "30", "1"]);

        let test_out = Frame::read_csv(&artifact.transformed_test_file_path).unwrap();
        assert_eq!(test_out.rows()[0][2], "-1");
        assert!(artifact.transformed_object_file_path.exists());
    }

    #[tokio::test]
    async fn test_missing_target_fails() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().join("run"), temp.path().join("models"));
        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            layout,
        };
        let train = temp.path().join("train.csv");
        write(&train, "a,b\n1,2\n");

        let input = DataValidationArtifact {
            validation_status: true,
            train_file_path: train.clone(),
            test_file_path: train,
            drift_report_file_path: temp.path().join("report.yaml"),
        };
        let err = DataTransformation::new(&DataSettings::default())
            .run(&ctx, &input)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("target column 'Result' missing"));
    }
}
