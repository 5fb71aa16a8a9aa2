//! Remote sync against an in-memory object store.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Timelike;
use filetime::FileTime;
use futures::stream::BoxStream;
use netsec_pipeline::sync::{sync_all, RemoteSync, ARTIFACT_PREFIX, SAVED_MODELS_PREFIX};
use netsec_pipeline::{PipelineConfig, PipelineError};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, PutResult,
};
use tempfile::TempDir;

/// In-memory store that reports modification times in whole seconds, as S3 does
#[derive(Debug)]
struct WholeSeconds(InMemory);

impl fmt::Display for WholeSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WholeSeconds({})", self.0)
    }
}

fn truncate(mut meta: ObjectMeta) -> ObjectMeta {
    meta.last_modified = meta
        .last_modified
        .with_nanosecond(0)
        .unwrap_or(meta.last_modified);
    meta
}

#[async_trait]
impl ObjectStore for WholeSeconds {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.0.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.0.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        let mut result = self.0.get_opts(location, options).await?;
        result.meta = truncate(result.meta);
        Ok(result)
    }

    async fn head(&self, location: &ObjectPath) -> object_store::Result<ObjectMeta> {
        self.0.head(location).await.map(truncate)
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.0.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.0.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> object_store::Result<ListResult> {
        self.0.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.0.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &ObjectPath,
        to: &ObjectPath,
    ) -> object_store::Result<()> {
        self.0.copy_if_not_exists(from, to).await
    }
}

fn populate(root: &Path) {
    let run = root.join("03_07_2024_09_05_01");
    std::fs::create_dir_all(run.join("data_ingestion/ingested")).unwrap();
    std::fs::write(run.join("events.jsonl"), "{}\n").unwrap();
    std::fs::write(run.join("data_ingestion/ingested/train.csv"), "a,b\n1,2\n").unwrap();
    std::fs::write(run.join("data_ingestion/ingested/test.csv"), "a,b\n3,4\n").unwrap();
}

async fn remote_bytes(store: &InMemory, key: &str) -> Vec<u8> {
    store
        .get(&ObjectPath::from(key))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_first_sync_uploads_everything() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let store = Arc::new(InMemory::new());
    let remote = RemoteSync::new(store.clone(), "", "memory://");

    let report = remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();

    assert_eq!(
        report.uploaded,
        vec![
            "03_07_2024_09_05_01/data_ingestion/ingested/test.csv",
            "03_07_2024_09_05_01/data_ingestion/ingested/train.csv",
            "03_07_2024_09_05_01/events.jsonl",
        ]
    );
    assert!(report.skipped.is_empty());
    assert_eq!(report.remote, "memory://artifact");
    assert_eq!(
        remote_bytes(
            &store,
            "artifact/03_07_2024_09_05_01/data_ingestion/ingested/train.csv"
        )
        .await,
        b"a,b\n1,2\n"
    );
}

#[tokio::test]
async fn test_second_sync_transfers_nothing() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let remote = RemoteSync::new(Arc::new(InMemory::new()), "", "memory://");

    let first = remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();
    let second = remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();

    assert!(second.uploaded.is_empty());
    assert_eq!(second.skipped, first.uploaded);
}

#[tokio::test]
async fn test_whole_second_remote_times_skip_fresh_uploads() {
    let temp = TempDir::new().unwrap();
    for i in 0..5 {
        std::fs::write(temp.path().join(format!("f{}.txt", i)), format!("file {}", i)).unwrap();
    }
    let remote = RemoteSync::new(Arc::new(WholeSeconds(InMemory::new())), "", "memory://");

    // Written and uploaded within the same second
    let first = remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();
    let second = remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();

    assert_eq!(first.uploaded.len(), 5);
    assert!(second.uploaded.is_empty(), "re-uploaded {:?}", second.uploaded);
    assert_eq!(second.skipped, first.uploaded);
}

#[tokio::test]
async fn test_changed_files_are_uploaded_again() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let store = Arc::new(InMemory::new());
    let remote = RemoteSync::new(store.clone(), "", "memory://");
    remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();

    let run = temp.path().join("03_07_2024_09_05_01");

    // New size
    std::fs::write(run.join("events.jsonl"), "{}\n{}\n").unwrap();

    // Same size, newer modification time
    let train = run.join("data_ingestion/ingested/train.csv");
    std::fs::write(&train, "a,b\n5,6\n").unwrap();
    let later = SystemTime::now() + Duration::from_secs(3600);
    filetime::set_file_mtime(&train, FileTime::from_system_time(later)).unwrap();

    let report = remote.sync(temp.path(), ARTIFACT_PREFIX).await.unwrap();

    assert_eq!(
        report.uploaded,
        vec![
            "03_07_2024_09_05_01/data_ingestion/ingested/train.csv",
            "03_07_2024_09_05_01/events.jsonl",
        ]
    );
    assert_eq!(
        report.skipped,
        vec!["03_07_2024_09_05_01/data_ingestion/ingested/test.csv"]
    );
    assert_eq!(
        remote_bytes(&store, "artifact/03_07_2024_09_05_01/events.jsonl").await,
        b"{}\n{}\n"
    );
}

#[tokio::test]
async fn test_missing_directory_is_sync_error() {
    let temp = TempDir::new().unwrap();
    let remote = RemoteSync::new(Arc::new(InMemory::new()), "", "memory://");

    let err = remote
        .sync(&temp.path().join("absent"), ARTIFACT_PREFIX)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Sync { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_sync_all_mirrors_both_roots() {
    let temp = TempDir::new().unwrap();
    let config = PipelineConfig::new(
        "sqlite:///unused",
        temp.path().join("Artifacts"),
        temp.path().join("saved_models"),
    );
    populate(&config.artifact_root);
    std::fs::create_dir_all(config.model_root.join("1709802301")).unwrap();
    std::fs::write(config.model_root.join("1709802301/model.json"), "{}").unwrap();

    let store = Arc::new(InMemory::new());
    let remote = RemoteSync::new(store.clone(), "team", "memory://");

    let reports = sync_all(&remote, &config).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].remote, "memory://team/artifact");
    assert_eq!(reports[0].uploaded.len(), 3);
    assert_eq!(reports[1].remote, format!("memory://team/{}", SAVED_MODELS_PREFIX));
    assert_eq!(reports[1].uploaded, vec!["1709802301/model.json"]);
    assert_eq!(
        remote_bytes(&store, "team/saved_models/1709802301/model.json").await,
        b"{}"
    );
}

#[tokio::test]
async fn test_sync_all_stops_when_artifacts_are_missing() {
    let temp = TempDir::new().unwrap();
    let config = PipelineConfig::new(
        "sqlite:///unused",
        temp.path().join("Artifacts"),
        temp.path().join("saved_models"),
    );
    std::fs::create_dir_all(config.model_root.join("1709802301")).unwrap();
    std::fs::write(config.model_root.join("1709802301/model.json"), "{}").unwrap();

    let store = Arc::new(InMemory::new());
    let remote = RemoteSync::new(store.clone(), "", "memory://");

    let err = sync_all(&remote, &config).await.unwrap_err();
    assert!(matches!(err, PipelineError::Sync { .. }));
    assert!(store
        .head(&ObjectPath::from("saved_models/1709802301/model.json"))
        .await
        .is_err());
}
