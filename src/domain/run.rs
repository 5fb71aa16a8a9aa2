//! Run state.
//!
//! A Run is the transient aggregate of one end-to-end execution. It lives
//! only while the orchestrator works; what persists is the artifact
//! directory and its run log.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::artifact::StageArtifact;
use super::events::{Event, EventType};
use super::stage::{StageKind, StageStatus};
use crate::error::PipelineError;

/// One end-to-end execution of the six stages
#[derive(Debug, Serialize)]
pub struct Run {
    pub id: Uuid,

    /// Timestamped directory holding the artifacts and the run log
    pub artifact_dir: PathBuf,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Artifacts produced so far, in stage order
    pub artifacts: Vec<StageArtifact>,

    /// Every stage, NotStarted until the orchestrator reaches it
    pub stage_statuses: BTreeMap<StageKind, StageStatus>,

    /// The error that failed the run, kept for callers that need its kind
    #[serde(skip)]
    pub failure: Option<PipelineError>,
}

impl Run {
    pub fn new(id: Uuid, artifact_dir: PathBuf) -> Self {
        Self {
            id,
            artifact_dir,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            artifacts: Vec::new(),
            stage_statuses: StageKind::ALL
                .iter()
                .map(|k| (*k, StageStatus::NotStarted))
                .collect(),
            failure: None,
        }
    }

    /// Reconstruct run state from a run log.
    ///
    /// Artifacts are not part of the log; only statuses and the terminal
    /// state come back.
    pub fn from_events(artifact_dir: PathBuf, events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id, artifact_dir);
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Fold one log event into the run
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
            }
            EventType::RunSucceeded => {
                self.state = RunState::Succeeded;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                if let Some(stage) = event.stage {
                    self.state = RunState::Failed {
                        stage,
                        position: stage.position(),
                        error: event.error.clone().unwrap_or_default(),
                    };
                }
                self.completed_at = Some(event.timestamp);
            }
            EventType::StageStarted => {
                if let Some(stage) = event.stage {
                    self.stage_statuses.insert(stage, StageStatus::Running);
                }
            }
            EventType::StageCompleted => {
                if let Some(stage) = event.stage {
                    self.stage_statuses.insert(stage, StageStatus::Completed);
                }
            }
            EventType::StageFailed => {
                if let Some(stage) = event.stage {
                    self.stage_statuses.insert(stage, StageStatus::Failed);
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.state, RunState::Succeeded)
    }

    /// Position of the failed stage, if the run failed
    pub fn failed_at(&self) -> Option<usize> {
        match self.state {
            RunState::Failed { position, .. } => Some(position),
            _ => None,
        }
    }

    pub fn stage_status(&self, stage: StageKind) -> StageStatus {
        self.stage_statuses.get(&stage).copied().unwrap_or_default()
    }

    /// The artifact produced by `stage`, if it completed
    pub fn artifact(&self, stage: StageKind) -> Option<&StageArtifact> {
        self.artifacts.iter().find(|a| a.kind() == stage)
    }

    /// Turn a failed run into its error, hand back a successful one
    pub fn into_result(mut self) -> Result<Self, PipelineError> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    Running,

    /// Every stage completed
    Succeeded,

    /// Aborted at the given stage (1-based position)
    Failed {
        stage: StageKind,
        position: usize,
        error: String,
    },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}
