//! The stage contract and the fixed set of stages a run executes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Artifact, DataIngestionArtifact, DataTransformationArtifact, DataValidationArtifact,
    EvaluationInput, ModelEvaluationArtifact, ModelPusherArtifact, ModelTrainerArtifact,
};

use super::layout::ArtifactLayout;

/// What every stage of a run can see besides its input artifact
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub layout: ArtifactLayout,
}

/// One unit of pipeline work.
///
/// A stage either returns a complete artifact or an error. It writes only
/// under its own stage directory and overwrites whatever is there, so
/// re-running after a failure needs no cleanup.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Upstream artifacts this stage consumes
    type Input: Send + Sync;

    /// Artifact this stage produces; its `KIND` names the stage
    type Output: Artifact;

    async fn run(&self, ctx: &RunContext, input: &Self::Input) -> anyhow::Result<Self::Output>;
}

pub type IngestionStage = Box<dyn Stage<Input = (), Output = DataIngestionArtifact>>;
pub type ValidationStage =
    Box<dyn Stage<Input = DataIngestionArtifact, Output = DataValidationArtifact>>;
pub type TransformationStage =
    Box<dyn Stage<Input = DataValidationArtifact, Output = DataTransformationArtifact>>;
pub type TrainingStage =
    Box<dyn Stage<Input = DataTransformationArtifact, Output = ModelTrainerArtifact>>;
pub type EvaluationStage = Box<dyn Stage<Input = EvaluationInput, Output = ModelEvaluationArtifact>>;
pub type PublishingStage =
    Box<dyn Stage<Input = ModelEvaluationArtifact, Output = ModelPusherArtifact>>;

/// The six stages, one slot each; the types pin the artifact chain
pub struct StageSet {
    pub ingestion: IngestionStage,
    pub validation: ValidationStage,
    pub transformation: TransformationStage,
    pub training: TrainingStage,
    pub evaluation: EvaluationStage,
    pub publishing: PublishingStage,
}
