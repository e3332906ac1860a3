//! Live document and collection subscriptions.
//!
//! Each subscription is a task that delivers an initial snapshot, then
//! re-reads and delivers again whenever the store's change feed reports a
//! write to the watched document or collection. Delivery goes through the
//! subscription's gate, so nothing is delivered after disposal.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{Document, DocumentStore, OrderBy, StoreError};
use crate::subscription::{Gate, Listener, Subscription};

/// Watch a single document. The listener receives `Ok(None)` while the
/// document does not exist.
pub fn subscribe_one(
    store: Arc<dyn DocumentStore>,
    collection: &str,
    id: &str,
    listener: Listener<Result<Option<Document>, StoreError>>,
) -> Subscription {
    let gate = Gate::new();
    // Subscribe before the first read so no write slips between them.
    let mut changes = store.changes();
    let collection = collection.to_owned();
    let id = id.to_owned();

    let task = tokio::spawn({
        let gate = gate.clone();
        async move {
            let snapshot = store.read_one(&collection, &id).await;
            gate.run(|| listener(snapshot));
            loop {
                match changes.recv().await {
                    Ok(change) if change.collection == collection && change.id == id => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%collection, %id, skipped, "document watch lagged; re-reading");
                    }
                    Err(RecvError::Closed) => break,
                }
                let snapshot = store.read_one(&collection, &id).await;
                if !gate.run(|| listener(snapshot)) {
                    break;
                }
            }
        }
    });
    Subscription::new(gate).with_task(task)
}

/// Watch every document in a collection, re-delivering the full ordered
/// list on each change.
pub fn subscribe_collection(
    store: Arc<dyn DocumentStore>,
    collection: &str,
    order_by: Option<OrderBy>,
    listener: Listener<Result<Vec<Document>, StoreError>>,
) -> Subscription {
    let gate = Gate::new();
    let mut changes = store.changes();
    let collection = collection.to_owned();

    let task = tokio::spawn({
        let gate = gate.clone();
        async move {
            let snapshot = store.query(&collection, order_by.as_ref()).await;
            gate.run(|| listener(snapshot));
            loop {
                match changes.recv().await {
                    Ok(change) if change.collection == collection => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%collection, skipped, "collection watch lagged; re-querying");
                    }
                    Err(RecvError::Closed) => break,
                }
                let snapshot = store.query(&collection, order_by.as_ref()).await;
                if !gate.run(|| listener(snapshot)) {
                    break;
                }
            }
        }
    });
    Subscription::new(gate).with_task(task)
}

#[cfg(test)]
#[path = "watch_test.rs"]
mod tests;
