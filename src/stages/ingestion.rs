//! Data ingestion: export the collection and split it into train and test.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::core::layout::{TEST_FILE_NAME, TRAIN_FILE_NAME};
use crate::core::{RunContext, Stage};
use crate::data::Frame;
use crate::domain::DataIngestionArtifact;
use crate::store::DocumentStore;

use super::blocking;

/// Store-assigned key, never a feature
const ID_FIELD: &str = "_id";

pub struct DataIngestion {
    store: Arc<dyn DocumentStore>,
    database: String,
    collection: String,
    test_ratio: f64,
    seed: u64,
}

impl DataIngestion {
    pub fn new(store: Arc<dyn DocumentStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            database: config.database_name.clone(),
            collection: config.collection_name.clone(),
            test_ratio: config.data.test_ratio,
            seed: config.data.split_seed,
        }
    }
}

#[async_trait]
impl Stage for DataIngestion {
    type Input = ();
    type Output = DataIngestionArtifact;

    #[instrument(skip_all, fields(collection = %self.collection))]
    async fn run(&self, ctx: &RunContext, _input: &()) -> Result<DataIngestionArtifact> {
        let documents = self
            .store
            .find_all(&self.database, &self.collection)
            .await
            .with_context(|| {
                format!(
                    "Failed to export {}.{}",
                    self.database, self.collection
                )
            })?;
        if documents.is_empty() {
            bail!(
                "collection {}.{} holds no documents",
                self.database,
                self.collection
            );
        }
        info!(documents = documents.len(), "Exported collection");

        let feature_store = ctx.layout.feature_store_file();
        let ingested = ctx.layout.ingested_dir();
        let (test_ratio, seed) = (self.test_ratio, self.seed);

        blocking(move || {
            let frame = Frame::from_documents(&documents, &[ID_FIELD]);
            frame.write_csv(&feature_store)?;

            let (train_rows, test_rows) = split_indices(frame.len(), test_ratio, seed)?;
            let artifact = DataIngestionArtifact {
                trained_file_path: ingested.join(TRAIN_FILE_NAME),
                test_file_path: ingested.join(TEST_FILE_NAME),
            };
            frame
                .select_rows(&train_rows)
                .write_csv(&artifact.trained_file_path)?;
            frame
                .select_rows(&test_rows)
                .write_csv(&artifact.test_file_path)?;

            info!(
                train = train_rows.len(),
                test = test_rows.len(),
                "Split feature store"
            );
            Ok(artifact)
        })
        .await
    }
}

/// Seeded shuffle of `0..n`; the first `ceil(ratio * n)` go to test.
///
/// Returns (train, test); together they cover every row exactly once.
pub fn split_indices(n: usize, test_ratio: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = ((test_ratio * n as f64) - 1e-9).ceil().max(0.0) as usize;
    if n_test == 0 || n_test >= n {
        bail!(
            "{} row(s) cannot be split into non-empty train and test sets at ratio {}",
            n,
            test_ratio
        );
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}
