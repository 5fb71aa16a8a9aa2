//! The six training stages.
//!
//! Each stage reads only the artifact it is handed (plus its own settings),
//! writes under its own directory of the run, and returns a new artifact.
//! CPU- and file-heavy work runs on the blocking pool.

pub mod evaluation;
pub mod ingestion;
pub mod publishing;
pub mod training;
pub mod transformation;
pub mod validation;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::PipelineConfig;
use crate::core::StageSet;
use crate::store::DocumentStore;

pub use evaluation::ModelEvaluation;
pub use ingestion::DataIngestion;
pub use publishing::ModelPusher;
pub use training::ModelTrainer;
pub use transformation::DataTransformation;
pub use validation::DataValidation;

/// The standard stage set for `config`, exporting from `store`
pub fn standard(config: &PipelineConfig, store: Arc<dyn DocumentStore>) -> StageSet {
    StageSet {
        ingestion: Box::new(DataIngestion::new(store, config)),
        validation: Box::new(DataValidation::new(&config.data)),
        transformation: Box::new(DataTransformation::new(&config.data)),
        training: Box::new(ModelTrainer::new(
            &config.data.target_column,
            config.model.clone(),
        )),
        evaluation: Box::new(ModelEvaluation::new(&config.model)),
        publishing: Box::new(ModelPusher),
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Stage task aborted")?
}
