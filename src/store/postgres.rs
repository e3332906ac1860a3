//! Postgres document store.
//!
//! Documents live in a single `documents` table keyed by `(collection, id)`
//! with the fields in a JSONB column. A trigger publishes every insert,
//! update and delete on the `document_changes` channel; a listener task
//! forwards those notifications to the store's broadcast feed, so changes
//! made by other server instances reach local subscriptions too.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Change, Document, DocumentStore, Fields, OrderBy, StoreError, now_rfc3339, resolve_server_timestamps, sort_documents};

const CHANGE_CHANNEL: &str = "document_changes";
const CHANGE_CHANNEL_CAPACITY: usize = 256;
const LISTENER_RETRY: Duration = Duration::from_secs(1);

pub struct PgDocumentStore {
    pool: PgPool,
    changes: broadcast::Sender<Change>,
    listener: JoinHandle<()>,
}

impl PgDocumentStore {
    /// Start listening for change notifications and return the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification listener cannot connect.
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let task = tokio::spawn(forward_notifications(listener, changes.clone()));
        info!(channel = CHANGE_CHANNEL, "document change listener started");
        Ok(Self { pool, changes, listener: task })
    }
}

impl Drop for PgDocumentStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn forward_notifications(mut listener: PgListener, changes: broadcast::Sender<Change>) {
    loop {
        match listener.recv().await {
            Ok(notification) => match serde_json::from_str::<Change>(notification.payload()) {
                Ok(change) => {
                    let _ = changes.send(change);
                }
                Err(e) => warn!(error = %e, payload = notification.payload(), "bad change notification"),
            },
            Err(e) => {
                // The listener reconnects on the next recv.
                warn!(error = %e, "document change listener error");
                tokio::time::sleep(LISTENER_RETRY).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, (Json<Fields>,)>("SELECT fields FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(fields),)| Document::new(id, fields)))
    }

    async fn write_one(&self, collection: &str, id: &str, mut fields: Fields, merge: bool) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        let sql = if merge {
            r"INSERT INTO documents (collection, id, fields)
              VALUES ($1, $2, $3)
              ON CONFLICT (collection, id)
              DO UPDATE SET fields = documents.fields || EXCLUDED.fields, updated_at = now()"
        } else {
            r"INSERT INTO documents (collection, id, fields)
              VALUES ($1, $2, $3)
              ON CONFLICT (collection, id)
              DO UPDATE SET fields = EXCLUDED.fields, updated_at = now()"
        };
        sqlx::query(sql)
            .bind(collection)
            .bind(id)
            .bind(Json(fields))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_one(&self, collection: &str, id: &str, mut fields: Fields) -> Result<bool, StoreError> {
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        let result = sqlx::query(
            r"INSERT INTO documents (collection, id, fields)
              VALUES ($1, $2, $3)
              ON CONFLICT (collection, id) DO NOTHING",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(fields))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add(&self, collection: &str, mut fields: Fields) -> Result<String, StoreError> {
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(fields))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn query(&self, collection: &str, order_by: Option<&OrderBy>) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, (String, Json<Fields>)>("SELECT id, fields FROM documents WHERE collection = $1")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        let mut docs: Vec<Document> = rows.into_iter().map(|(id, Json(fields))| Document::new(id, fields)).collect();
        sort_documents(&mut docs, order_by);
        Ok(docs)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}
