//! netsec - Artifact-chained training pipeline
//!
//! Loads tabular source data into a document store, then drives a fixed
//! sequence of training stages whose typed artifacts hand off from one
//! stage to the next, and finally mirrors the results to object storage.
//!
//! # Architecture
//!
//! - Every stage produces exactly one artifact type; the orchestrator
//!   verifies it before the next stage sees it
//! - The first failing stage aborts the run (fail-fast)
//! - Each run writes to a fresh timestamped directory and logs its
//!   transitions as JSONL events there
//! - Retries belong to the scheduler-facing job, never to the orchestrator
//!
//! # Modules
//!
//! - `data`: CSV loading, tables, schema
//! - `store`: Document store backends and the bulk-insert sink
//! - `domain`: Data structures (Artifact, Event, Run, Stage)
//! - `core`: Orchestration (TrainingPipeline, EventStore, TrainingJob)
//! - `stages`: The six standard stages
//! - `ml`: Imputer, classifier, drift test, metrics
//! - `sync`: Remote mirror of artifact and model directories
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Load the raw CSV into the document store
//! netsec load --file Network_Data/phisingData.csv
//!
//! # Train, then sync, retried up to two more times
//! netsec run --retries 2
//!
//! # Inspect the latest run
//! netsec status
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod data;
pub mod domain;
pub mod error;
pub mod ml;
pub mod stages;
pub mod store;
pub mod sync;

// Re-export main types at crate root for convenience
pub use crate::config::PipelineConfig;
pub use crate::core::{run_training, sync_to_remote, TrainingJob, TrainingPipeline};
pub use domain::{Event, EventType, Record, Run, RunState, StageKind};
pub use error::PipelineError;
