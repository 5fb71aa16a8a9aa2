//! Domain types for the training pipeline.
//!
//! This module contains the core data structures:
//! - Record: one normalized source row
//! - Artifacts: typed, immutable stage handoffs
//! - Events: Immutable records of run progress
//! - Run: Pipeline execution state

pub mod artifact;
pub mod events;
pub mod record;
pub mod run;
pub mod stage;

// Re-export commonly used types
pub use artifact::{
    Artifact, ClassificationMetric, DataIngestionArtifact, DataTransformationArtifact,
    DataValidationArtifact, EvaluationInput, ModelEvaluationArtifact, ModelPusherArtifact,
    ModelTrainerArtifact, StageArtifact,
};
pub use events::{Event, EventType};
pub use record::{Document, Record};
pub use run::{Run, RunState};
pub use stage::{StageKind, StageStatus};
