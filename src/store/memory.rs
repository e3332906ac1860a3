//! In-memory document store for tests and local development.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::{Change, Document, DocumentStore, Fields, OrderBy, StoreError, now_rfc3339, resolve_server_timestamps, sort_documents};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    changes: broadcast::Sender<Change>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { collections: RwLock::new(HashMap::new()), changes }
    }

    fn notify(&self, collection: &str, id: &str) {
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(Change { collection: collection.to_owned(), id: id.to_owned() });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn write_one(&self, collection: &str, id: &str, mut fields: Fields, merge: bool) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        {
            let mut collections = self.collections.write().await;
            let docs = collections.entry(collection.to_owned()).or_default();
            match docs.get_mut(id) {
                Some(existing) if merge => existing.extend(fields),
                _ => {
                    docs.insert(id.to_owned(), fields);
                }
            }
        }
        self.notify(collection, id);
        Ok(())
    }

    async fn create_one(&self, collection: &str, id: &str, mut fields: Fields) -> Result<bool, StoreError> {
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        let created = {
            let mut collections = self.collections.write().await;
            match collections.entry(collection.to_owned()).or_default().entry(id.to_owned()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(fields);
                    true
                }
            }
        };
        if created {
            self.notify(collection, id);
        }
        Ok(created)
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut collections = self.collections.write().await;
            collections.get_mut(collection).and_then(|docs| docs.remove(id)).is_some()
        };
        if removed {
            self.notify(collection, id);
        }
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.write_one(collection, &id, fields, false).await?;
        Ok(id)
    }

    async fn query(&self, collection: &str, order_by: Option<&OrderBy>) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = {
            let collections = self.collections.read().await;
            collections
                .get(collection)
                .map(|docs| docs.iter().map(|(id, fields)| Document::new(id.clone(), fields.clone())).collect())
                .unwrap_or_default()
        };
        sort_documents(&mut docs, order_by);
        Ok(docs)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
