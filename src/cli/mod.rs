//! Command-line interface for netsec.
//!
//! Provides the one-shot CSV loader, the training run, the remote sync,
//! the composed scheduler unit, run status and configuration display.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::core::{run_training, sync_to_remote, EventStore, RetryPolicy, TrainingJob};
use crate::data::load_records;
use crate::domain::{Run, RunState, StageArtifact, StageKind};
use crate::store;
use crate::sync::SyncReport;

/// netsec - Artifact-chained training pipeline
#[derive(Parser, Debug)]
#[command(name = "netsec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: search for .netsec/config.yaml)
    #[arg(short, long, global = true, env = "NETSEC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a CSV file into the document store
    Load {
        /// Source CSV file with a header row
        #[arg(short, long)]
        file: PathBuf,

        /// Target database (default: configured database_name)
        #[arg(long)]
        database: Option<String>,

        /// Target collection (default: configured collection_name)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Run the training pipeline once
    Train,

    /// Mirror artifacts and saved models to the remote bucket
    Sync,

    /// Train, then sync on success; retried as a unit
    Run {
        /// Extra attempts after the first failure
        #[arg(short, long, default_value = "2")]
        retries: u32,
    },

    /// Show the status of a run (default: the latest)
    Status {
        /// Run directory
        run_dir: Option<PathBuf>,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = PipelineConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Load {
                file,
                database,
                collection,
            } => {
                let database = database.unwrap_or_else(|| config.database_name.clone());
                let collection = collection.unwrap_or_else(|| config.collection_name.clone());
                load_csv(&config, &file, &database, &collection).await
            }
            Commands::Train => train(&config).await,
            Commands::Sync => sync(&config).await,
            Commands::Run { retries } => run_job(config, retries).await,
            Commands::Status { run_dir } => show_status(&config, run_dir).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Load a CSV file and bulk-insert its rows
async fn load_csv(
    config: &PipelineConfig,
    file: &Path,
    database: &str,
    collection: &str,
) -> Result<()> {
    let records = load_records(file)?;
    let store = store::connect(config.store_uri()?)?;
    let inserted = store::push_records(store.as_ref(), records, database, collection).await?;

    println!("{}", inserted);
    eprintln!("\n[Inserted {} record(s) into {}.{}]", inserted, database, collection);
    Ok(())
}

async fn train(config: &PipelineConfig) -> Result<()> {
    let run = run_training(config).await?;
    print_run(&run);
    eprintln!("\n[Run {} completed successfully]", run.id);
    Ok(())
}

async fn sync(config: &PipelineConfig) -> Result<()> {
    let reports = sync_to_remote(config).await?;
    print_sync(&reports);
    Ok(())
}

async fn run_job(config: PipelineConfig, retries: u32) -> Result<()> {
    let job = TrainingJob::new(config, RetryPolicy::with_retries(retries));
    let outcome = job.run().await?;

    print_run(&outcome.run);
    print_sync(&outcome.sync);
    eprintln!(
        "\n[Run {} completed and synced on attempt {}]",
        outcome.run.id, outcome.attempts
    );
    Ok(())
}

fn print_run(run: &Run) {
    println!("Run ID: {}", run.id);
    println!("Artifacts: {}", run.artifact_dir.display());

    if let Some(StageArtifact::Training(trainer)) = run.artifact(StageKind::Training) {
        println!(
            "Test f1: {:.4} (train {:.4})",
            trainer.test_metric_artifact.f1_score, trainer.train_metric_artifact.f1_score
        );
    }
    if let Some(StageArtifact::Publishing(pusher)) = run.artifact(StageKind::Publishing) {
        let verb = if pusher.pushed { "Published" } else { "Kept" };
        println!("{} model: {}", verb, pusher.saved_model_path.display());
        println!("SHA-256: {}", pusher.model_sha256);
    }
}

fn print_sync(reports: &[SyncReport]) {
    for report in reports {
        println!(
            "{} -> {}: {} uploaded, {} up to date",
            report.local.display(),
            report.remote,
            report.uploaded.len(),
            report.skipped.len()
        );
    }
}

/// Show the status of a run
async fn show_status(config: &PipelineConfig, run_dir: Option<PathBuf>) -> Result<()> {
    let run_dir = match run_dir {
        Some(dir) => dir,
        None => EventStore::list_runs(&config.artifact_root)
            .await?
            .pop()
            .with_context(|| format!("No runs found in {}", config.artifact_root.display()))?,
    };

    let run = EventStore::for_run_dir(&run_dir).load_run().await?;

    println!("Run ID: {}", run.id);
    println!("Directory: {}", run.artifact_dir.display());
    match &run.state {
        RunState::Running => println!("State: running"),
        RunState::Succeeded => println!("State: succeeded"),
        RunState::Failed {
            stage,
            position,
            error,
        } => println!("State: failed at stage {} ({}): {}", position, stage, error),
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("\nStage statuses:");
    for (stage, status) in &run.stage_statuses {
        println!("  {}. {}: {:?}", stage.position(), stage, status);
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(config: &PipelineConfig) -> Result<()> {
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using environment and defaults)".to_string())
    );
    println!();
    let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}
