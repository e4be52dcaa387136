use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod memory;

/// A schemaless document in the remote store: an opaque id plus a JSON
/// field map. Typing happens one layer up, in the data access layer.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub fields: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The remote call itself failed. Distinct from "no match", which is
    /// a normal `Ok(None)` result.
    #[error("store transport failure: {0}")]
    Transport(String),
    #[error("document {id} not found in collection '{collection}'")]
    NotFound { collection: String, id: Uuid },
    #[error("malformed document {id} in collection '{collection}': {source}")]
    Decode {
        collection: String,
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
}

/// Capability surface of the remote document store. The app depends only
/// on this set: one-shot queries, single-field equality lookup, partial
/// updates, and a change-notification channel per collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot fetch of up to `limit` documents.
    async fn list(&self, collection: &str, limit: Option<usize>)
        -> Result<Vec<Document>, StoreError>;

    /// Single-field equality lookup, limited to one document.
    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Insert a new document; the store assigns the id.
    async fn insert(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Merge the given fields into an existing document. Unmentioned
    /// fields are left untouched.
    async fn update(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Permanently remove a document.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError>;

    /// Change notifications for a collection. Each tick means "the result
    /// set may have changed, re-fetch"; subscribers always re-read the
    /// full snapshot, never diffs.
    fn watch(&self, collection: &str) -> Result<broadcast::Receiver<()>, StoreError>;
}
