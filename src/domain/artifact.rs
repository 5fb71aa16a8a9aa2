//! Artifacts handed from one stage to the next.
//!
//! Each stage produces exactly one artifact type. Artifacts carry paths and
//! scalar metrics only, never data payloads, and are never mutated once a
//! stage returns them.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::stage::StageKind;

/// Contract shared by every stage output
pub trait Artifact: Clone + Send + Sync + 'static {
    /// The stage that produces this artifact type
    const KIND: StageKind;

    /// Check that every declared field is populated and points at real data
    fn verify(&self) -> Result<()>;

    /// Provenance copy recorded on the run
    fn to_stage_artifact(&self) -> StageArtifact;
}

fn require_file(label: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{} is not set", label);
    }
    let meta = std::fs::metadata(path)
        .with_context(|| format!("{} does not exist: {}", label, path.display()))?;
    if !meta.is_file() {
        bail!("{} is not a file: {}", label, path.display());
    }
    if meta.len() == 0 {
        bail!("{} is empty: {}", label, path.display());
    }
    Ok(())
}

fn require_unit_interval(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        bail!("{} must be within [0, 1], got {}", label, value);
    }
    Ok(())
}

/// Train/test split exported from the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub trained_file_path: PathBuf,
    pub test_file_path: PathBuf,
}

impl Artifact for DataIngestionArtifact {
    const KIND: StageKind = StageKind::Ingestion;

    fn verify(&self) -> Result<()> {
        require_file("trained_file_path", &self.trained_file_path)?;
        require_file("test_file_path", &self.test_file_path)?;
        if self.trained_file_path == self.test_file_path {
            bail!("train and test splits point at the same file");
        }
        Ok(())
    }

    fn to_stage_artifact(&self) -> StageArtifact {
        StageArtifact::Ingestion(self.clone())
    }
}

/// Schema and drift verdict over the ingested split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    /// False when dataset drift was detected
    pub validation_status: bool,
    pub train_file_path: PathBuf,
    pub test_file_path: PathBuf,
    pub drift_report_file_path: PathBuf,
}

impl Artifact for DataValidationArtifact {
    const KIND: StageKind = StageKind::Validation;

    fn verify(&self) -> Result<()> {
        require_file("train_file_path", &self.train_file_path)?;
        require_file("test_file_path", &self.test_file_path)?;
        require_file("drift_report_file_path", &self.drift_report_file_path)
    }

    fn to_stage_artifact(&self) -> StageArtifact {
        StageArtifact::Validation(self.clone())
    }
}

/// Imputed feature tables and the fitted preprocessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

impl Artifact for DataTransformationArtifact {
    const KIND: StageKind = StageKind::Transformation;

    fn verify(&self) -> Result<()> {
        require_file("transformed_object_file_path", &self.transformed_object_file_path)?;
        require_file("transformed_train_file_path", &self.transformed_train_file_path)?;
        require_file("transformed_test_file_path", &self.transformed_test_file_path)
    }

    fn to_stage_artifact(&self) -> StageArtifact {
        StageArtifact::Transformation(self.clone())
    }
}

/// Binary classification scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

impl ClassificationMetric {
    pub fn verify(&self) -> Result<()> {
        require_unit_interval("f1_score", self.f1_score)?;
        require_unit_interval("precision_score", self.precision_score)?;
        require_unit_interval("recall_score", self.recall_score)
    }
}

/// Trained model bundle plus its scores on both splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub train_metric_artifact: ClassificationMetric,
    pub test_metric_artifact: ClassificationMetric,
}

impl Artifact for ModelTrainerArtifact {
    const KIND: StageKind = StageKind::Training;

    fn verify(&self) -> Result<()> {
        require_file("trained_model_file_path", &self.trained_model_file_path)?;
        self.train_metric_artifact
            .verify()
            .context("train_metric_artifact")?;
        self.test_metric_artifact
            .verify()
            .context("test_metric_artifact")
    }

    fn to_stage_artifact(&self) -> StageArtifact {
        StageArtifact::Training(self.clone())
    }
}

/// Evaluation needs the validated test split and the freshly trained model
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub validation: DataValidationArtifact,
    pub trainer: ModelTrainerArtifact,
}

/// Comparison of the trained model against the current best model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationArtifact {
    pub is_model_accepted: bool,
    /// Trained f1 minus best f1 (the trained f1 itself when no best model exists)
    pub improved_accuracy: f64,
    pub best_model_path: PathBuf,
    pub trained_model_path: PathBuf,
    pub train_model_metric_artifact: ClassificationMetric,
    pub best_model_metric_artifact: ClassificationMetric,
    pub report_file_path: PathBuf,
}

impl Artifact for ModelEvaluationArtifact {
    const KIND: StageKind = StageKind::Evaluation;

    fn verify(&self) -> Result<()> {
        if !self.improved_accuracy.is_finite() {
            bail!("improved_accuracy is not finite");
        }
        require_file("best_model_path", &self.best_model_path)?;
        require_file("trained_model_path", &self.trained_model_path)?;
        require_file("report_file_path", &self.report_file_path)?;
        self.train_model_metric_artifact
            .verify()
            .context("train_model_metric_artifact")?;
        self.best_model_metric_artifact
            .verify()
            .context("best_model_metric_artifact")
    }

    fn to_stage_artifact(&self) -> StageArtifact {
        StageArtifact::Evaluation(self.clone())
    }
}

/// Deployable model location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPusherArtifact {
    /// Whether this run published a new model
    pub pushed: bool,
    /// The model now serving from the saved-models directory
    pub saved_model_path: PathBuf,
    /// The model file this run produced (copied under the run when pushed)
    pub model_file_path: PathBuf,
    /// SHA-256 of the saved model bytes
    pub model_sha256: String,
}

impl Artifact for ModelPusherArtifact {
    const KIND: StageKind = StageKind::Publishing;

    fn verify(&self) -> Result<()> {
        require_file("saved_model_path", &self.saved_model_path)?;
        require_file("model_file_path", &self.model_file_path)?;
        if self.model_sha256.len() != 64 {
            bail!("model_sha256 is not a SHA-256 hex digest");
        }
        Ok(())
    }

    fn to_stage_artifact(&self) -> StageArtifact {
        StageArtifact::Publishing(self.clone())
    }
}

/// Provenance record of a stage output, in run order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum StageArtifact {
    Ingestion(DataIngestionArtifact),
    Validation(DataValidationArtifact),
    Transformation(DataTransformationArtifact),
    Training(ModelTrainerArtifact),
    Evaluation(ModelEvaluationArtifact),
    Publishing(ModelPusherArtifact),
}

impl StageArtifact {
    pub fn kind(&self) -> StageKind {
        match self {
            StageArtifact::Ingestion(_) => StageKind::Ingestion,
            StageArtifact::Validation(_) => StageKind::Validation,
            StageArtifact::Transformation(_) => StageKind::Transformation,
            StageArtifact::Training(_) => StageKind::Training,
            StageArtifact::Evaluation(_) => StageKind::Evaluation,
            StageArtifact::Publishing(_) => StageKind::Publishing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ingestion_artifact_requires_non_empty_files() {
        let temp = TempDir::new().unwrap();
        let train = temp.path().join("train.csv");
        let test = temp.path().join("test.csv");
        std::fs::write(&train, "a,b\n1,2\n").unwrap();
        std::fs::write(&test, "").unwrap();

        let artifact = DataIngestionArtifact {
            trained_file_path: train.clone(),
            test_file_path: test.clone(),
        };
        let err = artifact.verify().unwrap_err();
        assert!(err.to_string().contains("test_file_path is empty"));

        std::fs::write(&test, "a,b\n3,4\n").unwrap();
        assert!(artifact.verify().is_ok());
    }

    #[test]
    fn test_unset_path_is_rejected() {
        let artifact = DataIngestionArtifact {
            trained_file_path: PathBuf::new(),
            test_file_path: PathBuf::from("test.csv"),
        };
        assert!(artifact
            .verify()
            .unwrap_err()
            .to_string()
            .contains("not set"));
    }

    #[test]
    fn test_metric_bounds() {
        let ok = ClassificationMetric {
            f1_score: 0.9,
            precision_score: 1.0,
            recall_score: 0.0,
        };
        assert!(ok.verify().is_ok());

        let bad = ClassificationMetric {
            f1_score: f64::NAN,
            ..ok
        };
        assert!(bad.verify().is_err());
    }

    #[test]
    fn test_stage_artifact_kind() {
        let artifact = DataIngestionArtifact {
            trained_file_path: PathBuf::from("a"),
            test_file_path: PathBuf::from("b"),
        };
        assert_eq!(artifact.to_stage_artifact().kind(), StageKind::Ingestion);
        assert_eq!(<DataIngestionArtifact as Artifact>::KIND, StageKind::Ingestion);
    }
}
