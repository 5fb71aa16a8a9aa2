//! Error taxonomy shared by the loader, the document store sink, the
//! orchestrator and the remote sync step.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::StageKind;

/// A single file that could not be mirrored to the remote destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Path relative to the synced directory
    pub path: String,

    /// Reason reported by the object store (or local filesystem)
    pub reason: String,
}

/// Errors surfaced by the pipeline and its collaborators
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The tabular source file is missing, unreadable or malformed
    #[error("Failed to read source {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    /// The document store endpoint is unreachable or rejected the credentials
    #[error("Document store connection failed: {0}")]
    Connection(String),

    /// The bulk insert was rejected; `inserted` documents were already accepted
    #[error("Bulk insert into {database}.{collection} rejected after {inserted} document(s): {reason}")]
    Insert {
        database: String,
        collection: String,
        inserted: usize,
        reason: String,
    },

    /// A sink precondition was violated (empty batch, bad identifier)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A pipeline stage failed or produced an artifact that did not verify
    #[error("Stage '{stage}' (stage {}) failed: {cause:#}", .stage.position())]
    StageFailure {
        stage: StageKind,
        cause: anyhow::Error,
    },

    /// One or more files could not be copied to the remote destination
    #[error("Failed to sync {} to {remote}: {} file(s) failed{}", .local.display(), .failures.len(), first_failure(.failures))]
    Sync {
        local: PathBuf,
        remote: String,
        failures: Vec<FileFailure>,
    },

    /// Configuration could not be resolved into a usable pipeline config
    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn first_failure(failures: &[FileFailure]) -> String {
    failures
        .first()
        .map(|f| format!(" (first: {}: {})", f.path, f.reason))
        .unwrap_or_default()
}

impl PipelineError {
    /// Wrap a stage's internal error with the stage it came from
    pub fn stage(stage: StageKind, cause: anyhow::Error) -> Self {
        Self::StageFailure { stage, cause }
    }

    /// Whether re-running the same unit of work may succeed.
    ///
    /// Connection problems and transfer failures are transient; a malformed
    /// source or a contract violation will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Sync { .. } => true,
            Self::StageFailure { cause, .. } => cause.chain().any(|e| {
                matches!(
                    e.downcast_ref::<PipelineError>(),
                    Some(PipelineError::Connection(_))
                )
            }),
            _ => false,
        }
    }

    /// The stage that failed, if this is a stage failure
    pub fn failed_stage(&self) -> Option<StageKind> {
        match self {
            Self::StageFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
