//! Shared fixtures for unit tests.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    error::{AuthError, PersistenceError},
    identity::{normalize_email, Identity, IdentityProvider},
    store::{new_id, Document, DocumentStore, SqliteDocumentStore},
};

/// Migrated in-memory database. A single connection keeps the database alive
/// for the pool's lifetime.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn memory_store() -> SqliteDocumentStore {
    SqliteDocumentStore::new(memory_pool().await).await.unwrap()
}

fn outage() -> PersistenceError {
    PersistenceError::Unavailable("simulated outage".to_string())
}

/// Wraps a real store, counting calls and failing reads or writes on demand.
///
/// `fail_lists` only fails whole-collection reads (`get_all`) and
/// `fail_lookups` only fails keyed or filtered reads (`get`, `find_eq`).
pub struct FlakyStore {
    inner: SqliteDocumentStore,
    pub fail_reads: AtomicBool,
    pub fail_lists: AtomicBool,
    pub fail_lookups: AtomicBool,
    pub fail_writes: AtomicBool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FlakyStore {
    pub async fn new() -> Self {
        Self {
            inner: memory_store().await,
            fail_reads: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self, switch: &AtomicBool) -> Result<(), PersistenceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) || switch.load(Ordering::SeqCst) {
            return Err(outage());
        }
        Ok(())
    }

    fn write(&self) -> Result<(), PersistenceError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(outage());
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, PersistenceError> {
        self.read(&self.fail_lists)?;
        self.inner.get_all(collection).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, PersistenceError> {
        self.read(&self.fail_lookups)?;
        self.inner.get(collection, id).await
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, PersistenceError> {
        self.read(&self.fail_lookups)?;
        self.inner.find_eq(collection, field, value).await
    }

    async fn add(
        &self,
        collection: &str,
        data: Value,
        timestamp_field: &str,
    ) -> Result<Document, PersistenceError> {
        self.write()?;
        self.inner.add(collection, data, timestamp_field).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), PersistenceError> {
        self.write()?;
        self.inner.set(collection, id, data).await
    }
}

/// Identity provider double that records every call.
#[derive(Default)]
pub struct RecordingIdentities {
    pub created: Mutex<Vec<Identity>>,
    pub deleted: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl RecordingIdentities {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for RecordingIdentities {
    async fn create_identity(&self, email: &str, _password: &str) -> Result<Identity, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let email = normalize_email(email);
        let mut created = self.created.lock().unwrap();
        if created.iter().any(|identity| identity.email == email) {
            return Err(AuthError::IdentityExists(email));
        }
        let identity = Identity { uid: new_id(), email };
        created.push(identity.clone());
        Ok(identity)
    }

    async fn verify_credentials(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let email = normalize_email(email);
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn delete_identity(&self, uid: &str) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().retain(|identity| identity.uid != uid);
        self.deleted.lock().unwrap().push(uid.to_string());
        Ok(())
    }
}
