use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PersistenceError;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One stored document: the key assigned by (or given to) the store plus its
/// JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Decodes the body into a record, exposing the key as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PersistenceError> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        Ok(serde_json::from_value(data)?)
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, PersistenceError> {
    Ok(serde_json::to_value(value)?)
}

/// Document-collection storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of the collection, in the store's native order.
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, PersistenceError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, PersistenceError>;

    /// Documents whose top-level `field` equals `value`.
    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, PersistenceError>;

    /// Inserts a new document under a store-assigned key, writing a store
    /// timestamp into `timestamp_field`. Timestamps strictly increase across
    /// every `add` of one store.
    async fn add(
        &self,
        collection: &str,
        data: Value,
        timestamp_field: &str,
    ) -> Result<Document, PersistenceError>;

    /// Creates or overwrites the document stored under `id`.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), PersistenceError>;
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document, PersistenceError> {
        Ok(Document {
            id: self.id,
            data: serde_json::from_str(&self.data)?,
        })
    }
}

pub struct SqliteDocumentStore {
    pool: SqlitePool,
    last_stamp: Mutex<i64>,
}

impl SqliteDocumentStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, PersistenceError> {
        let (last,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COALESCE(MAX(stamp_us), 0) FROM documents",
        )
        .fetch_one(&pool)
        .await?;

        Ok(Self {
            pool,
            last_stamp: Mutex::new(last),
        })
    }
}

fn stamp_to_rfc3339(stamp_us: i64) -> Result<String, PersistenceError> {
    DateTime::<Utc>::from_timestamp_micros(stamp_us)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .ok_or_else(|| PersistenceError::Unavailable(format!("timestamp out of range: {stamp_us}")))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, PersistenceError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY seq",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, PersistenceError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data FROM documents WHERE collection = ? AND id = ? LIMIT 1",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DocumentRow::into_document).transpose()
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, PersistenceError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"SELECT id, data FROM documents
               WHERE collection = ? AND json_extract(data, ?) = ?
               ORDER BY seq"#,
        )
        .bind(collection)
        .bind(format!("$.{field}"))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    async fn add(
        &self,
        collection: &str,
        mut data: Value,
        timestamp_field: &str,
    ) -> Result<Document, PersistenceError> {
        let Value::Object(map) = &mut data else {
            return Err(PersistenceError::Unavailable(
                "documents must be JSON objects".to_string(),
            ));
        };

        // Held across the insert so stamps follow insertion order.
        let mut last = self.last_stamp.lock().await;
        let stamp = Utc::now().timestamp_micros().max(*last + 1);
        map.insert(
            timestamp_field.to_string(),
            Value::String(stamp_to_rfc3339(stamp)?),
        );

        let id = new_id();
        sqlx::query(
            r#"INSERT INTO documents (collection, id, data, stamp_us)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(collection)
        .bind(&id)
        .bind(serde_json::to_string(&data)?)
        .bind(stamp)
        .execute(&self.pool)
        .await?;
        *last = stamp;

        Ok(Document { id, data })
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"INSERT INTO documents (collection, id, data)
               VALUES (?, ?, ?)
               ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data"#,
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(&data)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
