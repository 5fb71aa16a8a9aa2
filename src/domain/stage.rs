//! Stage identities and per-stage status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The six stages, in the fixed order the orchestrator runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    #[serde(rename = "data_ingestion")]
    Ingestion,
    #[serde(rename = "data_validation")]
    Validation,
    #[serde(rename = "data_transformation")]
    Transformation,
    #[serde(rename = "model_trainer")]
    Training,
    #[serde(rename = "model_evaluation")]
    Evaluation,
    #[serde(rename = "model_pusher")]
    Publishing,
}

impl StageKind {
    /// All stages in execution order
    pub const ALL: [StageKind; 6] = [
        StageKind::Ingestion,
        StageKind::Validation,
        StageKind::Transformation,
        StageKind::Training,
        StageKind::Evaluation,
        StageKind::Publishing,
    ];

    /// 1-based position in the run (the N of "failed at stage N")
    pub fn position(self) -> usize {
        match self {
            StageKind::Ingestion => 1,
            StageKind::Validation => 2,
            StageKind::Transformation => 3,
            StageKind::Training => 4,
            StageKind::Evaluation => 5,
            StageKind::Publishing => 6,
        }
    }

    /// Directory / log name of the stage
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Ingestion => "data_ingestion",
            StageKind::Validation => "data_validation",
            StageKind::Transformation => "data_transformation",
            StageKind::Training => "model_trainer",
            StageKind::Evaluation => "model_evaluation",
            StageKind::Publishing => "model_pusher",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage within a run.
///
/// `NotStarted → Running → {Completed, Failed}`; a failed stage is retried
/// only by re-running the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}
