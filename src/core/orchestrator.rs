//! Pipeline orchestrator.
//!
//! Runs the six stages strictly in order, hands each verified artifact to
//! the next stage, and stops at the first failure. Every transition is
//! appended to the run log in the run directory. Retrying is the caller's
//! job; the orchestrator makes exactly one attempt.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::{
    Artifact, EvaluationInput, Event, EventType, Run, RunState, StageKind, StageStatus,
};
use crate::error::PipelineError;
use crate::stages;
use crate::store;

use super::event_store::EventStore;
use super::layout::ArtifactLayout;
use super::stage::{RunContext, Stage, StageSet};

/// Main pipeline orchestrator
pub struct TrainingPipeline {
    config: PipelineConfig,
    stages: StageSet,
}

impl TrainingPipeline {
    /// Orchestrator with the standard stages, reading from the configured store
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let store = Arc::from(store::connect(config.store_uri()?)?);
        let stages = stages::standard(&config, store);
        Ok(Self { config, stages })
    }

    /// Orchestrator with caller-supplied stages
    pub fn with_stages(config: PipelineConfig, stages: StageSet) -> Self {
        Self { config, stages }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// The returned run is either `Succeeded` or `Failed` at the stage that
    /// broke; in the latter case `run.failure` carries the error.
    #[instrument(skip(self), fields(artifact_root = %self.config.artifact_root.display()))]
    pub async fn execute(&self) -> Run {
        let run_id = Uuid::new_v4();

        let layout = match ArtifactLayout::create(
            &self.config.artifact_root,
            &self.config.model_root,
            Utc::now(),
        ) {
            Ok(layout) => layout,
            Err(e) => {
                // Without a run directory there is nowhere to log; report the
                // run as failed before its first stage
                let mut run = Run::new(run_id, self.config.artifact_root.clone());
                let err = PipelineError::stage(
                    StageKind::Ingestion,
                    e.context("Failed to create run directory"),
                );
                error!(error = %err, "Run failed");
                run.state = RunState::Failed {
                    stage: StageKind::Ingestion,
                    position: StageKind::Ingestion.position(),
                    error: err.to_string(),
                };
                run.completed_at = Some(Utc::now());
                run.failure = Some(err);
                return run;
            }
        };

        info!(%run_id, run_dir = %layout.run_dir().display(), "Starting pipeline run");

        let log = EventStore::open(&layout);
        let mut run = Run::new(run_id, layout.run_dir().to_path_buf());
        let ctx = RunContext { run_id, layout };

        record(
            &log,
            Event::new(
                run_id,
                None,
                EventType::RunStarted,
                "Training pipeline started".to_string(),
                StageStatus::Running,
            ),
        )
        .await;

        match self.run_stages(&ctx, &log, &mut run).await {
            Ok(()) => self.complete_run(&log, &mut run).await,
            Err(err) => self.handle_run_failure(&log, &mut run, err).await,
        }

        run
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        log: &EventStore,
        run: &mut Run,
    ) -> Result<(), PipelineError> {
        let s = &self.stages;

        let ingestion = execute_stage(ctx, log, run, s.ingestion.as_ref(), &()).await?;
        let validation = execute_stage(ctx, log, run, s.validation.as_ref(), &ingestion).await?;
        let transformation =
            execute_stage(ctx, log, run, s.transformation.as_ref(), &validation).await?;
        let trainer = execute_stage(ctx, log, run, s.training.as_ref(), &transformation).await?;

        let evaluation_input = EvaluationInput {
            validation,
            trainer,
        };
        let evaluation =
            execute_stage(ctx, log, run, s.evaluation.as_ref(), &evaluation_input).await?;
        execute_stage(ctx, log, run, s.publishing.as_ref(), &evaluation).await?;

        Ok(())
    }

    /// Handle a run failure
    async fn handle_run_failure(&self, log: &EventStore, run: &mut Run, err: PipelineError) {
        let error_msg = err.to_string();
        error!(%error_msg, "Run failed");

        let stage = err.failed_stage().unwrap_or(StageKind::Ingestion);
        run.state = RunState::Failed {
            stage,
            position: stage.position(),
            error: error_msg.clone(),
        };
        run.completed_at = Some(Utc::now());

        record(
            log,
            Event::new(
                run.id,
                Some(stage),
                EventType::RunFailed,
                format!("Run failed at stage {} ({})", stage.position(), stage),
                StageStatus::Failed,
            )
            .with_error(error_msg),
        )
        .await;

        run.failure = Some(err);
    }

    /// Complete a successful run
    async fn complete_run(&self, log: &EventStore, run: &mut Run) {
        info!(run_id = %run.id, "Run completed successfully");

        run.state = RunState::Succeeded;
        run.completed_at = Some(Utc::now());

        record(
            log,
            Event::new(
                run.id,
                None,
                EventType::RunSucceeded,
                "Training pipeline completed".to_string(),
                StageStatus::Completed,
            ),
        )
        .await;
    }
}

/// Run one stage, verify its artifact, and record both on the run
async fn execute_stage<I, O>(
    ctx: &RunContext,
    log: &EventStore,
    run: &mut Run,
    stage: &dyn Stage<Input = I, Output = O>,
    input: &I,
) -> Result<O, PipelineError>
where
    I: Send + Sync,
    O: Artifact,
{
    let kind = O::KIND;
    let started = Instant::now();

    info!(stage = %kind, position = kind.position(), "Stage started");
    run.stage_statuses.insert(kind, StageStatus::Running);
    record(
        log,
        Event::new(
            run.id,
            Some(kind),
            EventType::StageStarted,
            format!("Stage '{}' started", kind),
            StageStatus::Running,
        ),
    )
    .await;

    let result = match stage.run(ctx, input).await {
        Ok(artifact) => artifact
            .verify()
            .map(|()| artifact)
            .map_err(|e| e.context(format!("{} produced an incomplete artifact", kind))),
        Err(e) => Err(e),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(artifact) => {
            run.stage_statuses.insert(kind, StageStatus::Completed);
            run.artifacts.push(artifact.to_stage_artifact());
            record(
                log,
                Event::new(
                    run.id,
                    Some(kind),
                    EventType::StageCompleted,
                    format!("Stage '{}' completed in {}ms", kind, duration_ms),
                    StageStatus::Completed,
                )
                .with_duration(duration_ms),
            )
            .await;
            info!(stage = %kind, duration_ms, "Stage completed");
            Ok(artifact)
        }
        Err(cause) => {
            let err = PipelineError::stage(kind, cause);
            run.stage_statuses.insert(kind, StageStatus::Failed);
            record(
                log,
                Event::new(
                    run.id,
                    Some(kind),
                    EventType::StageFailed,
                    format!("Stage '{}' failed", kind),
                    StageStatus::Failed,
                )
                .with_duration(duration_ms)
                .with_error(err.to_string()),
            )
            .await;
            error!(stage = %kind, duration_ms, error = %err, "Stage failed");
            Err(err)
        }
    }
}

/// The run log is a record, not a dependency; a write failure is logged
async fn record(log: &EventStore, event: Event) {
    if let Err(e) = log.append(&event).await {
        warn!(
            path = %log.events_path().display(),
            error = %e,
            "Failed to append run event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataIngestionArtifact, DataValidationArtifact};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Ingestion that claims files it never wrote
    struct HollowIngestion;

    #[async_trait]
    impl Stage for HollowIngestion {
        type Input = ();
        type Output = DataIngestionArtifact;

        async fn run(&self, _ctx: &RunContext, _input: &()) -> anyhow::Result<DataIngestionArtifact> {
            Ok(DataIngestionArtifact {
                trained_file_path: PathBuf::from("nowhere/train.csv"),
                test_file_path: PathBuf::from("nowhere/test.csv"),
            })
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Stage for Unreachable {
        type Input = DataIngestionArtifact;
        type Output = DataValidationArtifact;

        async fn run(
            &self,
            _ctx: &RunContext,
            _input: &DataIngestionArtifact,
        ) -> anyhow::Result<DataValidationArtifact> {
            panic!("validation must not run after a failed ingestion");
        }
    }

    #[tokio::test]
    async fn test_unverified_artifact_fails_its_stage() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::new(
            "sqlite:///unused",
            temp.path().join("Artifacts"),
            temp.path().join("saved_models"),
        );
        let mut stages = stages::standard(
            &config,
            Arc::new(store::SqliteDocumentStore::new(temp.path())),
        );
        stages.ingestion = Box::new(HollowIngestion);
        stages.validation = Box::new(Unreachable);

        let run = TrainingPipeline::with_stages(config, stages).execute().await;

        assert_eq!(run.failed_at(), Some(1));
        assert_eq!(run.stage_status(StageKind::Ingestion), StageStatus::Failed);
        assert_eq!(run.stage_status(StageKind::Validation), StageStatus::NotStarted);
        assert!(run.artifacts.is_empty());

        let err = run.into_result().unwrap_err();
        assert!(err.to_string().contains("incomplete artifact"));
    }
}
