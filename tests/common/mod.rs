#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use import_service::models::{ImportError, ImportStats, ImportStatus, RecordError, Result};
use import_service::progress::ProgressSink;
use import_service::store::{DocumentStore, StoreFactory};

/// In-memory stand-in for the document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub docs: Arc<Mutex<HashMap<String, Value>>>,
    pub writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.docs.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.docs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.docs.lock().unwrap().contains_key(key))
    }

    async fn set_document(&self, key: &str, document: &Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.docs
            .lock()
            .unwrap()
            .insert(key.to_string(), document.clone());
        Ok(())
    }
}

/// Hands out the same memory store on every open and counts the opens, so
/// tests can assert which calls touch the store at all.
#[derive(Clone, Default)]
pub struct MemoryStoreFactory {
    pub store: MemoryStore,
    pub opens: Arc<AtomicUsize>,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn open(&self, _target: &str) -> Result<Box<dyn DocumentStore>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.store.clone()))
    }
}

/// Store whose write at `block_at` parks until the test releases it, so a
/// pause request can land while a record is in flight.
#[derive(Clone)]
pub struct BlockingStore {
    pub inner: MemoryStore,
    pub block_at: usize,
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl BlockingStore {
    pub fn new(inner: MemoryStore, block_at: usize) -> Self {
        Self {
            inner,
            block_at,
            reached: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl DocumentStore for BlockingStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn set_document(&self, key: &str, document: &Value) -> Result<()> {
        if self.inner.write_count() == self.block_at {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.set_document(key, document).await
    }
}

#[derive(Clone)]
pub struct BlockingStoreFactory {
    pub store: BlockingStore,
}

#[async_trait]
impl StoreFactory for BlockingStoreFactory {
    async fn open(&self, _target: &str) -> Result<Box<dyn DocumentStore>> {
        Ok(Box::new(self.store.clone()))
    }
}

/// Store that fails with a connection error once `fail_at` writes happened.
#[derive(Clone)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_at: usize,
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn set_document(&self, key: &str, document: &Value) -> Result<()> {
        if self.inner.write_count() == self.fail_at {
            return Err(ImportError::StoreConnection("connection reset".to_string()));
        }
        self.inner.set_document(key, document).await
    }
}

#[derive(Clone)]
pub struct FailingStoreFactory {
    pub store: FailingStore,
}

#[async_trait]
impl StoreFactory for FailingStoreFactory {
    async fn open(&self, _target: &str) -> Result<Box<dyn DocumentStore>> {
        Ok(Box::new(self.store.clone()))
    }
}

/// Sink capturing everything it is told, for asserting event ordering.
#[derive(Default)]
pub struct RecordingSink {
    pub stats: Mutex<Vec<ImportStats>>,
    pub errors: Mutex<Vec<RecordError>>,
    pub statuses: Mutex<Vec<ImportStatus>>,
}

impl ProgressSink for RecordingSink {
    fn on_stats(&self, stats: &ImportStats) {
        self.stats.lock().unwrap().push(stats.clone());
    }

    fn on_record_error(&self, error: &RecordError) {
        self.errors.lock().unwrap().push(error.clone());
    }

    fn on_status_change(&self, status: ImportStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}
