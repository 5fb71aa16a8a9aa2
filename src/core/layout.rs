//! On-disk layout of one run's artifact directory and the saved models.
//!
//! ```text
//! <artifact_root>/<MM_DD_YYYY_HH_MM_SS>/
//!   data_ingestion/feature_store/network_data.csv
//!   data_ingestion/ingested/{train,test}.csv
//!   data_validation/{validated,invalid}/{train,test}.csv
//!   data_validation/drift_report/report.yaml
//!   data_transformation/transformed/{train,test}.csv
//!   data_transformation/transformed_object/preprocessing.json
//!   model_trainer/trained_model/model.json
//!   model_evaluation/report.yaml
//!   model_pusher/model.json
//!   events.jsonl
//! <model_root>/<unix_seconds>/model.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::domain::StageKind;

pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";
pub const MODEL_FILE_NAME: &str = "model.json";
const FEATURE_STORE_FILE_NAME: &str = "network_data.csv";
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Paths for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactLayout {
    run_dir: PathBuf,
    model_root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(run_dir: impl Into<PathBuf>, model_root: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            model_root: model_root.into(),
        }
    }

    /// Create a fresh, timestamp-named run directory under `artifact_root`.
    ///
    /// Two runs started within the same second get `_1`, `_2`, ... suffixes
    /// so neither overwrites the other.
    pub fn create(artifact_root: &Path, model_root: &Path, now: DateTime<Utc>) -> Result<Self> {
        std::fs::create_dir_all(artifact_root).with_context(|| {
            format!("Failed to create artifact root: {}", artifact_root.display())
        })?;

        let stamp = now.format("%m_%d_%Y_%H_%M_%S").to_string();
        let run_dir = unique_dir(artifact_root, &stamp)?;

        Ok(Self::new(run_dir, model_root))
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn model_root(&self) -> &Path {
        &self.model_root
    }

    pub fn stage_dir(&self, stage: StageKind) -> PathBuf {
        self.run_dir.join(stage.as_str())
    }

    pub fn events_file(&self) -> PathBuf {
        self.run_dir.join(EVENTS_FILE_NAME)
    }

    pub fn feature_store_file(&self) -> PathBuf {
        self.stage_dir(StageKind::Ingestion)
            .join("feature_store")
            .join(FEATURE_STORE_FILE_NAME)
    }

    pub fn ingested_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::Ingestion).join("ingested")
    }

    pub fn validated_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::Validation).join("validated")
    }

    pub fn invalid_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::Validation).join("invalid")
    }

    pub fn drift_report_file(&self) -> PathBuf {
        self.stage_dir(StageKind::Validation)
            .join("drift_report")
            .join("report.yaml")
    }

    pub fn transformed_dir(&self) -> PathBuf {
        self.stage_dir(StageKind::Transformation).join("transformed")
    }

    pub fn preprocessor_file(&self) -> PathBuf {
        self.stage_dir(StageKind::Transformation)
            .join("transformed_object")
            .join("preprocessing.json")
    }

    pub fn trained_model_file(&self) -> PathBuf {
        self.stage_dir(StageKind::Training)
            .join("trained_model")
            .join(MODEL_FILE_NAME)
    }

    pub fn evaluation_report_file(&self) -> PathBuf {
        self.stage_dir(StageKind::Evaluation).join("report.yaml")
    }

    pub fn pushed_model_file(&self) -> PathBuf {
        self.stage_dir(StageKind::Publishing).join(MODEL_FILE_NAME)
    }

    /// Directory for a newly published model, named by unix seconds
    pub fn new_saved_model_dir(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.model_root).with_context(|| {
            format!("Failed to create model root: {}", self.model_root.display())
        })?;
        unique_dir(&self.model_root, &now.timestamp().to_string())
    }
}

fn unique_dir(parent: &Path, name: &str) -> Result<PathBuf> {
    let mut candidate = parent.join(name);
    let mut n = 0;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = parent.join(format!("{}_{}", name, n));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create directory: {}", candidate.display()))
            }
        }
    }
}

/// Newest saved model under `model_root`, by the numeric directory name.
///
/// Directories that are not numbers, or hold no model file, are ignored.
pub fn latest_saved_model(model_root: &Path) -> Result<Option<PathBuf>> {
    if !model_root.exists() {
        return Ok(None);
    }

    let mut best: Option<((i64, u32), PathBuf)> = None;
    for entry in std::fs::read_dir(model_root)
        .with_context(|| format!("Failed to list {}", model_root.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(key) = name.to_str().and_then(parse_saved_model_dir) else {
            continue;
        };
        let model = entry.path().join(MODEL_FILE_NAME);
        if !model.is_file() {
            continue;
        }
        if best.as_ref().map(|(k, _)| key > *k).unwrap_or(true) {
            best = Some((key, model));
        }
    }

    Ok(best.map(|(_, path)| path))
}

/// `1700000000` or `1700000000_2`
fn parse_saved_model_dir(name: &str) -> Option<(i64, u32)> {
    match name.split_once('_') {
        Some((secs, n)) => Some((secs.parse().ok()?, n.parse().ok()?)),
        None => Some((name.parse().ok()?, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_run_dir_is_timestamped() {
        let temp = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let layout =
            ArtifactLayout::create(&temp.path().join("Artifacts"), &temp.path().join("m"), now)
                .unwrap();

        assert_eq!(
            layout.run_dir(),
            temp.path().join("Artifacts").join("03_07_2024_09_05_01")
        );
        assert!(layout.run_dir().is_dir());
        assert!(layout
            .trained_model_file()
            .ends_with("model_trainer/trained_model/model.json"));
    }

    #[test]
    fn test_same_second_runs_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let a = ArtifactLayout::create(temp.path(), temp.path(), now).unwrap();
        let b = ArtifactLayout::create(temp.path(), temp.path(), now).unwrap();

        assert_ne!(a.run_dir(), b.run_dir());
        assert!(b.run_dir().ends_with("03_07_2024_09_05_01_1"));
    }

    #[test]
    fn test_latest_saved_model_is_numeric_max() {
        let temp = TempDir::new().unwrap();
        for name in ["900", "1000", "1000_1", "notes"] {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(MODEL_FILE_NAME), "{}").unwrap();
        }
        // Newer but empty directory
        std::fs::create_dir_all(temp.path().join("2000")).unwrap();

        let latest = latest_saved_model(temp.path()).unwrap().unwrap();
        assert_eq!(latest, temp.path().join("1000_1").join(MODEL_FILE_NAME));
    }

    #[test]
    fn test_no_saved_models() {
        let temp = TempDir::new().unwrap();
        assert!(latest_saved_model(&temp.path().join("absent")).unwrap().is_none());
    }
}
