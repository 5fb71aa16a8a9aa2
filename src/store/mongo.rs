//! MongoDB document store.
//!
//! A client is created per call and dropped when the call returns; nothing
//! holds a long-lived connection pool across runs.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document as BsonDocument};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::Client;
use tracing::debug;

use super::{validate_identifier, DocumentStore};
use crate::domain::Document;
use crate::error::PipelineError;

pub struct MongoDocumentStore {
    uri: String,
}

impl MongoDocumentStore {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    async fn client(&self) -> Result<Client, PipelineError> {
        Client::with_uri_str(&self.uri)
            .await
            .map_err(|e| PipelineError::Connection(e.to_string()))
    }
}

fn is_connection_failure(err: &MongoError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Authentication { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. }
    )
}

fn classify(err: MongoError, database: &str, collection: &str) -> PipelineError {
    if is_connection_failure(&err) {
        return PipelineError::Connection(err.to_string());
    }

    // Ordered inserts stop at the first failing index; everything before it landed
    let inserted = match *err.kind {
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().map(|e| e.index).min())
            .unwrap_or(0),
        _ => 0,
    };

    PipelineError::Insert {
        database: database.to_string(),
        collection: collection.to_string(),
        inserted,
        reason: err.to_string(),
    }
}

fn to_json(doc: BsonDocument) -> Option<Document> {
    match Bson::Document(doc).into_relaxed_extjson() {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, PipelineError> {
        validate_identifier("database", database)?;
        validate_identifier("collection", collection)?;

        let bson_docs = documents
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<BsonDocument>, _>>()
            .map_err(|e| PipelineError::Insert {
                database: database.to_string(),
                collection: collection.to_string(),
                inserted: 0,
                reason: e.to_string(),
            })?;

        let client = self.client().await?;
        let coll = client
            .database(database)
            .collection::<BsonDocument>(collection);
        debug!(count = bson_docs.len(), "Inserting documents");

        let result = coll
            .insert_many(bson_docs, None)
            .await
            .map_err(|e| classify(e, database, collection))?;
        Ok(result.inserted_ids.len())
    }

    async fn find_all(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<Document>, PipelineError> {
        validate_identifier("database", database)?;
        validate_identifier("collection", collection)?;

        let client = self.client().await?;
        let coll = client
            .database(database)
            .collection::<BsonDocument>(collection);

        let cursor = coll
            .find(None, None)
            .await
            .map_err(|e| PipelineError::Connection(e.to_string()))?;
        let docs: Vec<BsonDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| PipelineError::Connection(e.to_string()))?;

        Ok(docs.into_iter().filter_map(to_json).collect())
    }

    async fn count(&self, database: &str, collection: &str) -> Result<u64, PipelineError> {
        validate_identifier("database", database)?;
        validate_identifier("collection", collection)?;

        let client = self.client().await?;
        client
            .database(database)
            .collection::<BsonDocument>(collection)
            .count_documents(None, None)
            .await
            .map_err(|e| PipelineError::Connection(e.to_string()))
    }
}
