pub mod redis;

pub use redis::*;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::Result;

/// Whether the key was already present before the write. Reported for
/// observability only; it never changes control flow.
#[derive(Debug, Clone, Copy)]
pub struct UpsertReport {
    pub existed: bool,
}

/// The external document store collaborator. One connection is owned
/// exclusively by a running session and dropped when the run stops.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Set the full document at the key's root.
    async fn set_document(&self, key: &str, document: &Value) -> Result<()>;

    /// Check-then-set upsert, reporting pre-existence.
    async fn upsert(&self, key: &str, document: &Value) -> Result<UpsertReport> {
        let existed = self.exists(key).await?;
        self.set_document(key, document).await?;
        Ok(UpsertReport { existed })
    }
}

/// Opens a store connection for one run. The production factory targets
/// Redis; tests substitute an in-memory implementation.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self, target: &str) -> Result<Box<dyn DocumentStore>>;
}

pub struct RedisStoreFactory;

#[async_trait]
impl StoreFactory for RedisStoreFactory {
    async fn open(&self, target: &str) -> Result<Box<dyn DocumentStore>> {
        let store = RedisDocumentStore::connect(target).await?;
        Ok(Box::new(store))
    }
}
