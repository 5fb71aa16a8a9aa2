//! Document store access and the bulk-insert sink.
//!
//! Backends are picked from the connection string scheme:
//! - `sqlite://<dir>`: one SQLite file per logical database
//! - `mongodb://`, `mongodb+srv://`: MongoDB (feature `mongo`)
//!
//! Every call acquires its own connection and releases it before
//! returning, on success and on error alike.

#[cfg(feature = "mongo")]
pub mod mongo;
pub mod sqlite;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::domain::{Document, Record};
use crate::error::PipelineError;

#[cfg(feature = "mongo")]
pub use mongo::MongoDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Largest document body the sink accepts (matches MongoDB's BSON limit)
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;

/// Schema-flexible store addressed by database and collection names
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Ordered bulk insert; returns the number of documents accepted.
    ///
    /// Not idempotent: inserting the same documents twice stores them twice.
    /// On a rejected document the already-accepted ones stay in place and the
    /// error reports how many there were.
    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, PipelineError>;

    /// Every document of a collection, in insertion order
    async fn find_all(&self, database: &str, collection: &str)
        -> Result<Vec<Document>, PipelineError>;

    /// Number of documents in a collection (0 if it does not exist)
    async fn count(&self, database: &str, collection: &str) -> Result<u64, PipelineError>;
}

/// Open the backend matching `connection_uri`
pub fn connect(connection_uri: &str) -> Result<Box<dyn DocumentStore>, PipelineError> {
    if let Some(root) = connection_uri.strip_prefix("sqlite://") {
        return Ok(Box::new(SqliteDocumentStore::new(root)));
    }

    if connection_uri.starts_with("mongodb://") || connection_uri.starts_with("mongodb+srv://") {
        #[cfg(feature = "mongo")]
        {
            return Ok(Box::new(MongoDocumentStore::new(connection_uri)));
        }
        #[cfg(not(feature = "mongo"))]
        {
            return Err(PipelineError::Config(
                "MongoDB support is not compiled in (enable the `mongo` feature)".to_string(),
            ));
        }
    }

    Err(PipelineError::Config(format!(
        "unsupported document store scheme in '{}'",
        crate::config::redact_uri(connection_uri)
    )))
}

/// Database and collection names: ASCII alphanumerics, `_` and `-`
pub fn validate_identifier(kind: &str, name: &str) -> Result<(), PipelineError> {
    if name.is_empty() {
        return Err(PipelineError::InvalidRequest(format!("{} name is empty", kind)));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PipelineError::InvalidRequest(format!(
            "{} name '{}' may only contain letters, digits, '_' and '-'",
            kind, name
        )));
    }
    Ok(())
}

/// Bulk-insert loaded records into `database.collection`.
///
/// Returns the exact number inserted. Re-running with the same records
/// duplicates them; no upsert key is derived from row content.
#[instrument(skip(store, records), fields(store = store.name(), count = records.len()))]
pub async fn push_records(
    store: &dyn DocumentStore,
    records: Vec<Record>,
    database: &str,
    collection: &str,
) -> Result<usize, PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "no records to insert".to_string(),
        ));
    }
    validate_identifier("database", database)?;
    validate_identifier("collection", collection)?;

    let expected = records.len();
    let documents: Vec<Document> = records.into_iter().map(Record::into_document).collect();

    let inserted = store.insert_many(database, collection, documents).await?;
    if inserted != expected {
        warn!(inserted, expected, "Store acknowledged fewer documents than sent");
        return Err(PipelineError::Insert {
            database: database.to_string(),
            collection: collection.to_string(),
            inserted,
            reason: format!("only {} of {} documents acknowledged", inserted, expected),
        });
    }

    info!(inserted, %database, %collection, "Inserted records");
    Ok(inserted)
}
