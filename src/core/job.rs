//! Scheduler-facing triggers.
//!
//! `run_training` and `sync_to_remote` are the two operations an external
//! scheduler invokes. `TrainingJob` composes them (sync only after a
//! successful run) and retries the composed unit as a whole.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::domain::Run;
use crate::error::PipelineError;
use crate::sync::{self, RemoteSync, SyncReport};

use super::orchestrator::TrainingPipeline;
use super::retry::RetryPolicy;

/// Execute one training run; a failed run comes back as its error
#[instrument(skip(config))]
pub async fn run_training(config: &PipelineConfig) -> Result<Run, PipelineError> {
    let pipeline = TrainingPipeline::new(config.clone())?;
    pipeline.execute().await.into_result()
}

/// Mirror the artifact root and the saved models to the configured bucket
#[instrument(skip(config), fields(bucket = %config.bucket_name))]
pub async fn sync_to_remote(config: &PipelineConfig) -> Result<Vec<SyncReport>, PipelineError> {
    let remote = RemoteSync::from_bucket(&config.bucket_name)?;
    sync::sync_all(&remote, config).await
}

/// What one successful composed unit produced
#[derive(Debug, Serialize)]
pub struct JobOutcome {
    pub run: Run,
    pub sync: Vec<SyncReport>,
    /// Attempt (1-based) that succeeded
    pub attempts: u32,
}

/// Train-then-sync unit with whole-unit retries and a run lock
pub struct TrainingJob {
    config: PipelineConfig,
    retry: RetryPolicy,
    remote: Option<RemoteSync>,
}

impl TrainingJob {
    pub fn new(config: PipelineConfig, retry: RetryPolicy) -> Self {
        Self {
            config,
            retry,
            remote: None,
        }
    }

    /// Sync through this client instead of the one `bucket_name` names
    pub fn with_remote(mut self, remote: RemoteSync) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Run the unit until it succeeds, fails permanently, or runs out of
    /// attempts. Holds the artifact-root lock for the whole time.
    #[instrument(skip(self), fields(max_attempts = self.retry.max_attempts))]
    pub async fn run(&self) -> Result<JobOutcome, PipelineError> {
        let _lock = acquire_lock(&self.config.artifact_root).await?;

        let ((run, sync), attempts) = self
            .retry
            .run(|attempt| async move {
                info!(attempt, "Starting training job attempt");
                self.run_once().await
            })
            .await?;

        info!(run_id = %run.id, attempts, "Training job finished");
        Ok(JobOutcome {
            run,
            sync,
            attempts,
        })
    }

    async fn run_once(&self) -> Result<(Run, Vec<SyncReport>), PipelineError> {
        let run = run_training(&self.config).await?;
        let reports = match &self.remote {
            Some(remote) => sync::sync_all(remote, &self.config).await?,
            None => sync_to_remote(&self.config).await?,
        };
        Ok((run, reports))
    }
}

/// `<parent>/.<artifact_root name>.lock`, outside the synced tree
pub fn lock_path(artifact_root: &Path) -> PathBuf {
    let name = artifact_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifacts".to_string());
    let parent = artifact_root
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    parent.join(format!(".{}.lock", name))
}

/// Exclusive advisory lock; blocks while another job holds it.
/// Released when the returned file is dropped.
async fn acquire_lock(artifact_root: &Path) -> Result<File, PipelineError> {
    let path = lock_path(artifact_root);
    let lock_err = |e: std::io::Error| {
        PipelineError::Config(format!("cannot lock {}: {}", path.display(), e))
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(lock_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .map_err(lock_err)?;

    tokio::task::spawn_blocking(move || file.lock_exclusive().map(|()| file))
        .await
        .map_err(|e| PipelineError::Config(format!("lock task aborted: {}", e)))?
        .map_err(lock_err)
}
