//! Per-run event log.
//!
//! Each run directory holds an `events.jsonl` file, one JSON event per
//! line, so the log is synced along with the artifacts it describes and a
//! finished run can be inspected without any other state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::{Event, Run};

use super::layout::{ArtifactLayout, EVENTS_FILE_NAME};

/// Append-only JSONL log of one run
pub struct EventStore {
    run_dir: PathBuf,
    events_path: PathBuf,
}

impl EventStore {
    pub fn open(layout: &ArtifactLayout) -> Self {
        Self {
            run_dir: layout.run_dir().to_path_buf(),
            events_path: layout.events_file(),
        }
    }

    /// Log of an existing run directory, e.g. one picked by `list_runs`
    pub fn for_run_dir(run_dir: &Path) -> Self {
        Self {
            run_dir: run_dir.to_path_buf(),
            events_path: run_dir.join(EVENTS_FILE_NAME),
        }
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append one event and flush it
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut line = serde_json::to_string(event).context("Failed to serialize event")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open run log: {}", self.events_path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Every event in append order; a run without a log has none
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open run log: {}", self.events_path.display()))?;
        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Malformed event in {}: {}", self.events_path.display(), line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Rebuild stage statuses and the terminal state from the log
    pub async fn load_run(&self) -> Result<Run> {
        let events = self.replay().await?;
        Run::from_events(self.run_dir.clone(), &events)
            .with_context(|| format!("No run log in {}", self.run_dir.display()))
    }

    /// Run directories under `artifact_root`, oldest first
    pub async fn list_runs(artifact_root: &Path) -> Result<Vec<PathBuf>> {
        if !artifact_root.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(artifact_root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            if let Ok(meta) = fs::metadata(path.join(EVENTS_FILE_NAME)).await {
                runs.push((meta.modified()?, path));
            }
        }

        runs.sort();
        Ok(runs.into_iter().map(|(_, path)| path).collect())
    }
}
