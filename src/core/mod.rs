//! Core orchestration logic.
//!
//! This module contains:
//! - Stage: the stage contract and the typed stage set
//! - Orchestrator: runs the stages in order, fail-fast
//! - EventStore: append-only run log
//! - Layout: artifact directory naming
//! - Job: scheduler-facing triggers and whole-unit retries

pub mod event_store;
pub mod job;
pub mod layout;
pub mod orchestrator;
pub mod retry;
pub mod stage;

// Re-export commonly used types
pub use event_store::EventStore;
pub use job::{run_training, sync_to_remote, JobOutcome, TrainingJob};
pub use layout::{latest_saved_model, ArtifactLayout};
pub use orchestrator::TrainingPipeline;
pub use retry::RetryPolicy;
pub use stage::{RunContext, Stage, StageSet};
