//! SQLite-backed document store.
//!
//! Layout: `<root>/<database>.db`, one table per collection holding one JSON
//! document per row. Databases and collections are created on first use.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::{validate_identifier, DocumentStore, MAX_DOCUMENT_BYTES};
use crate::domain::Document;
use crate::error::PipelineError;

pub struct SqliteDocumentStore {
    root: PathBuf,
}

impl SqliteDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_path(&self, database: &str) -> PathBuf {
        self.root.join(format!("{}.db", database))
    }
}

fn check_root(root: &Path) -> Result<(), PipelineError> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::Connection(format!(
            "store root {} does not exist",
            root.display()
        )))
    }
}

fn open_with(path: &Path, flags: OpenFlags) -> Result<Connection, PipelineError> {
    Connection::open_with_flags(path, flags)
        .map_err(|e| PipelineError::Connection(format!("{}: {}", path.display(), e)))
}

/// Open the database file for writing, creating it if absent
fn open(root: &Path, path: &Path) -> Result<Connection, PipelineError> {
    check_root(root)?;
    open_with(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )
}

/// Open an existing database read-only; `None` when it was never written
fn open_existing(root: &Path, path: &Path) -> Result<Option<Connection>, PipelineError> {
    check_root(root)?;
    if !path.exists() {
        return Ok(None);
    }
    open_with(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map(Some)
}

fn ensure_collection(conn: &Connection, collection: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL)",
        collection
    ))
}

fn collection_exists(conn: &Connection, collection: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [collection],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_blocking(
    root: &Path,
    path: &Path,
    database: &str,
    collection: &str,
    documents: Vec<Document>,
) -> Result<usize, PipelineError> {
    let insert_err = |inserted: usize, reason: String| PipelineError::Insert {
        database: database.to_string(),
        collection: collection.to_string(),
        inserted,
        reason,
    };

    let mut conn = open(root, path)?;
    ensure_collection(&conn, collection).map_err(|e| insert_err(0, e.to_string()))?;

    let tx = conn
        .transaction()
        .map_err(|e| insert_err(0, e.to_string()))?;
    let mut inserted = 0usize;
    let mut rejection = None;
    {
        let mut stmt = tx
            .prepare(&format!("INSERT INTO \"{}\" (body) VALUES (?1)", collection))
            .map_err(|e| insert_err(0, e.to_string()))?;

        for (i, doc) in documents.iter().enumerate() {
            let body = match serde_json::to_string(doc) {
                Ok(body) => body,
                Err(e) => {
                    rejection = Some(format!("document {}: {}", i, e));
                    break;
                }
            };
            if body.len() > MAX_DOCUMENT_BYTES {
                rejection = Some(format!(
                    "document {} is {} bytes, limit is {}",
                    i,
                    body.len(),
                    MAX_DOCUMENT_BYTES
                ));
                break;
            }
            if let Err(e) = stmt.execute([&body]) {
                rejection = Some(format!("document {}: {}", i, e));
                break;
            }
            inserted += 1;
        }
    }
    // Accepted documents stay even when a later one is rejected
    tx.commit().map_err(|e| insert_err(0, e.to_string()))?;

    match rejection {
        Some(reason) => Err(insert_err(inserted, reason)),
        None => Ok(inserted),
    }
}

fn find_blocking(
    root: &Path,
    path: &Path,
    collection: &str,
) -> Result<Vec<Document>, PipelineError> {
    let Some(conn) = open_existing(root, path)? else {
        return Ok(Vec::new());
    };
    let query_err = |e: rusqlite::Error| PipelineError::Connection(e.to_string());

    if !collection_exists(&conn, collection).map_err(query_err)? {
        return Ok(Vec::new());
    }

    let mut stmt = conn
        .prepare(&format!("SELECT body FROM \"{}\" ORDER BY id", collection))
        .map_err(query_err)?;
    let bodies = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(query_err)?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(query_err)?;

    bodies
        .iter()
        .map(|body| {
            serde_json::from_str::<Document>(body).map_err(|e| {
                PipelineError::Connection(format!("corrupt document in {}: {}", collection, e))
            })
        })
        .collect()
}

fn count_blocking(root: &Path, path: &Path, collection: &str) -> Result<u64, PipelineError> {
    let Some(conn) = open_existing(root, path)? else {
        return Ok(0);
    };
    let query_err = |e: rusqlite::Error| PipelineError::Connection(e.to_string());

    if !collection_exists(&conn, collection).map_err(query_err)? {
        return Ok(0);
    }
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", collection), [], |row| {
            row.get(0)
        })
        .map_err(query_err)?;
    Ok(count as u64)
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Connection(format!("store task aborted: {}", e)))?
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, PipelineError> {
        validate_identifier("database", database)?;
        validate_identifier("collection", collection)?;

        let root = self.root.clone();
        let path = self.database_path(database);
        let database = database.to_string();
        let collection = collection.to_string();
        debug!(path = %path.display(), count = documents.len(), "Inserting documents");

        blocking(move || insert_blocking(&root, &path, &database, &collection, documents)).await
    }

    async fn find_all(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<Document>, PipelineError> {
        validate_identifier("database", database)?;
        validate_identifier("collection", collection)?;

        let root = self.root.clone();
        let path = self.database_path(database);
        let collection = collection.to_string();

        blocking(move || find_blocking(&root, &path, &collection)).await
    }

    async fn count(&self, database: &str, collection: &str) -> Result<u64, PipelineError> {
        validate_identifier("database", database)?;
        validate_identifier("collection", collection)?;

        let root = self.root.clone();
        let path = self.database_path(database);
        let collection = collection.to_string();

        blocking(move || count_blocking(&root, &path, &collection)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_insert_then_find_in_order() {
        let temp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::new(temp.path());

        let docs = vec![doc(json!({"a": 1})), doc(json!({"a": 2})), doc(json!({"a": 3}))];
        let inserted = store.insert_many("db", "coll", docs).await.unwrap();
        assert_eq!(inserted, 3);

        let found = store.find_all("db", "coll").await.unwrap();
        let values: Vec<i64> = found.iter().map(|d| d["a"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(temp.path().join("db.db").exists());
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::new(temp.path());

        assert_eq!(store.count("db", "nothing").await.unwrap(), 0);
        assert!(store.find_all("db", "nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_do_not_create_database() {
        let temp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::new(temp.path());

        assert_eq!(store.count("ghost", "coll").await.unwrap(), 0);
        assert!(store.find_all("ghost", "coll").await.unwrap().is_empty());
        assert!(!temp.path().join("ghost.db").exists());

        let err = SqliteDocumentStore::new(temp.path().join("absent"))
            .count("ghost", "coll")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Connection(_)));
    }

    #[tokio::test]
    async fn test_missing_root_is_connection_error() {
        let temp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::new(temp.path().join("absent"));

        let err = store
            .insert_many("db", "coll", vec![doc(json!({"a": 1}))])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Connection(_)));
    }

    #[tokio::test]
    async fn test_oversized_document_keeps_earlier_inserts() {
        let temp = TempDir::new().unwrap();
        let store = SqliteDocumentStore::new(temp.path());

        let big = "x".repeat(MAX_DOCUMENT_BYTES + 1);
        let docs = vec![
            doc(json!({"a": 1})),
            doc(json!({"a": 2})),
            doc(json!({"blob": big})),
            doc(json!({"a": 4})),
        ];

        let err = store.insert_many("db", "coll", docs).await.unwrap_err();
        match err {
            PipelineError::Insert { inserted, .. } => assert_eq!(inserted, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count("db", "coll").await.unwrap(), 2);
    }
}
