use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{Document, DocumentStore, StoreError};

struct Collection {
    docs: Vec<Document>,
    notify: broadcast::Sender<()>,
}

impl Collection {
    fn new() -> Self {
        let (notify, _) = broadcast::channel(16);
        Self {
            docs: Vec::new(),
            notify,
        }
    }
}

/// In-process document store. Stands in for the hosted vendor store:
/// same capability set, same full-snapshot notification contract.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collection<T>(&self, name: &str, f: impl FnOnce(&mut Collection) -> T) -> T {
        let mut guard = self.collections.lock().unwrap();
        let coll = guard
            .entry(name.to_string())
            .or_insert_with(Collection::new);
        f(coll)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(
        &self,
        collection: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self.with_collection(collection, |c| {
            let take = limit.unwrap_or(c.docs.len());
            c.docs.iter().take(take).cloned().collect()
        }))
    }

    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.with_collection(collection, |c| {
            c.docs
                .iter()
                .find(|d| d.fields.get(field).and_then(Value::as_str) == Some(value))
                .cloned()
        }))
    }

    async fn insert(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let doc = Document {
            id: Uuid::new_v4(),
            fields,
        };
        self.with_collection(collection, |c| {
            c.docs.push(doc.clone());
            let _ = c.notify.send(());
        });
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.with_collection(collection, |c| {
            let Some(doc) = c.docs.iter_mut().find(|d| d.id == id) else {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id,
                });
            };
            for (k, v) in fields {
                doc.fields.insert(k, v);
            }
            let _ = c.notify.send(());
            Ok(())
        })
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        self.with_collection(collection, |c| {
            let before = c.docs.len();
            c.docs.retain(|d| d.id != id);
            if c.docs.len() == before {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id,
                });
            }
            let _ = c.notify.send(());
            Ok(())
        })
    }

    fn watch(&self, collection: &str) -> Result<broadcast::Receiver<()>, StoreError> {
        Ok(self.with_collection(collection, |c| c.notify.subscribe()))
    }
}
