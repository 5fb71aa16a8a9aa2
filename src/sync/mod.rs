//! One-way mirror of local directories to object storage.
//!
//! Uploads new and changed files, skips files whose remote copy has the same
//! size and is at least as new (to the second), and never deletes anything
//! remote. Running it
//! twice without local changes transfers nothing the second time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::error::{FileFailure, PipelineError};

/// Remote sub-path for the artifact root
pub const ARTIFACT_PREFIX: &str = "artifact";
/// Remote sub-path for the saved models
pub const SAVED_MODELS_PREFIX: &str = "saved_models";

/// Where `bucket_name` points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketLocation {
    S3 { bucket: String, prefix: String },
    Local(PathBuf),
    Memory,
}

impl BucketLocation {
    /// Accepts `name`, `s3://name[/prefix]`, `file:///dir` or `memory://`
    pub fn parse(bucket_name: &str) -> Result<Self, PipelineError> {
        let invalid = |reason: String| {
            PipelineError::Config(format!("invalid bucket '{}': {}", bucket_name, reason))
        };

        if !bucket_name.contains("://") {
            if bucket_name.is_empty() || bucket_name.contains('/') {
                return Err(invalid("expected a bucket name or URL".to_string()));
            }
            return Ok(Self::S3 {
                bucket: bucket_name.to_string(),
                prefix: String::new(),
            });
        }

        let url = Url::parse(bucket_name).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid("missing bucket".to_string()))?;
                Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    prefix: url.path().trim_matches('/').to_string(),
                })
            }
            "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| invalid("not a local path".to_string())),
            "memory" => Ok(Self::Memory),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }
}

/// Result of mirroring one directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub local: PathBuf,
    pub remote: String,
    /// Relative paths that were transferred
    pub uploaded: Vec<String>,
    /// Relative paths already up to date
    pub skipped: Vec<String>,
}

/// Object store client plus the key prefix everything is written under
pub struct RemoteSync {
    store: Arc<dyn ObjectStore>,
    root: String,
    description: String,
}

impl RemoteSync {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        root: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            store,
            root: root.into(),
            description: description.into(),
        }
    }

    /// Open the store named by a bucket name or URL.
    ///
    /// S3 credentials and region come from the standard AWS environment.
    pub fn from_bucket(bucket_name: &str) -> Result<Self, PipelineError> {
        let config_err = |e: object_store::Error| {
            PipelineError::Config(format!("cannot open bucket '{}': {}", bucket_name, e))
        };

        match BucketLocation::parse(bucket_name)? {
            BucketLocation::S3 { bucket, prefix } => {
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(&bucket)
                    .build()
                    .map_err(config_err)?;
                Ok(Self::new(Arc::new(s3), prefix, format!("s3://{}", bucket)))
            }
            BucketLocation::Local(dir) => {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    PipelineError::Config(format!("cannot create {}: {}", dir.display(), e))
                })?;
                let fs = LocalFileSystem::new_with_prefix(&dir).map_err(config_err)?;
                Ok(Self::new(Arc::new(fs), "", format!("file://{}", dir.display())))
            }
            BucketLocation::Memory => Ok(Self::new(Arc::new(InMemory::new()), "", "memory://")),
        }
    }

    /// Human-readable remote location of a prefix
    pub fn describe(&self, remote_prefix: &str) -> String {
        let mut out = self.description.clone();
        for part in [self.root.as_str(), remote_prefix] {
            if !part.is_empty() {
                if !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(part.trim_matches('/'));
            }
        }
        out
    }

    fn location(&self, remote_prefix: &str, relative: &str) -> ObjectPath {
        let joined = [self.root.as_str(), remote_prefix, relative]
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.trim_matches('/'))
            .collect::<Vec<_>>()
            .join("/");
        ObjectPath::from(joined)
    }

    /// Mirror `local_dir` under `remote_prefix`.
    ///
    /// Every file is attempted; if any fails the whole call fails with the
    /// per-file reasons.
    #[instrument(skip(self), fields(remote = %self.describe(remote_prefix)))]
    pub async fn sync(
        &self,
        local_dir: &Path,
        remote_prefix: &str,
    ) -> Result<SyncReport, PipelineError> {
        let remote = self.describe(remote_prefix);
        let sync_err = |failures: Vec<FileFailure>| PipelineError::Sync {
            local: local_dir.to_path_buf(),
            remote: remote.clone(),
            failures,
        };

        if !local_dir.is_dir() {
            return Err(sync_err(vec![FileFailure {
                path: String::new(),
                reason: "local directory does not exist".to_string(),
            }]));
        }

        let mut report = SyncReport {
            local: local_dir.to_path_buf(),
            remote: remote.clone(),
            ..Default::default()
        };
        let mut failures = Vec::new();

        for entry in WalkDir::new(local_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| relative_key(local_dir, p))
                        .unwrap_or_default();
                    failures.push(FileFailure {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_key(local_dir, entry.path());
            match self.sync_file(entry.path(), remote_prefix, &relative).await {
                Ok(true) => report.uploaded.push(relative),
                Ok(false) => report.skipped.push(relative),
                Err(reason) => {
                    warn!(file = %relative, %reason, "Failed to sync file");
                    failures.push(FileFailure {
                        path: relative,
                        reason,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(sync_err(failures));
        }

        info!(
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            "Directory synced"
        );
        Ok(report)
    }

    /// Ok(true) when uploaded, Ok(false) when already current
    async fn sync_file(
        &self,
        path: &Path,
        remote_prefix: &str,
        relative: &str,
    ) -> Result<bool, String> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| e.to_string())?;
        let local_modified: DateTime<Utc> = meta.modified().map_err(|e| e.to_string())?.into();
        let location = self.location(remote_prefix, relative);

        // S3 reports Last-Modified in whole seconds
        match self.store.head(&location).await {
            Ok(remote)
                if remote.size as u64 == meta.len()
                    && remote.last_modified.timestamp() >= local_modified.timestamp() =>
            {
                debug!(file = %relative, "Up to date");
                return Ok(false);
            }
            Ok(_) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(e.to_string()),
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        self.store
            .put(&location, PutPayload::from(bytes))
            .await
            .map_err(|e| e.to_string())?;
        debug!(file = %relative, "Uploaded");
        Ok(true)
    }
}

fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Mirror the artifact root, then the saved models; stops at the first
/// pair that fails.
#[instrument(skip(remote, config), fields(bucket = %config.bucket_name))]
pub async fn sync_all(
    remote: &RemoteSync,
    config: &PipelineConfig,
) -> Result<Vec<SyncReport>, PipelineError> {
    let pairs = [
        (config.artifact_root.as_path(), ARTIFACT_PREFIX),
        (config.model_root.as_path(), SAVED_MODELS_PREFIX),
    ];

    let mut reports = Vec::with_capacity(pairs.len());
    for (local, prefix) in pairs {
        reports.push(remote.sync(local, prefix).await?);
    }
    Ok(reports)
}
