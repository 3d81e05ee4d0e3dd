use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::models::*;
use crate::store::DocumentStore;

/// Redis-backed document store. Documents are written with `JSON.SET`; when
/// the server lacks the JSON module the store flips to plain string values
/// for the remainder of the process.
#[derive(Clone)]
pub struct RedisDocumentStore {
    conn: ConnectionManager,
    supports_json: Arc<AtomicBool>,
}

impl RedisDocumentStore {
    /// Open and validate a connection. A malformed URL is a configuration
    /// error; anything after that surfaces as a store connection error.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ImportError::Configuration(format!("invalid store URL: {}", e)))?;

        let mut conn = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            conn,
            supports_json: Arc::new(AtomicBool::new(true)),
        })
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let found: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found > 0)
    }

    async fn set_document(&self, key: &str, document: &Value) -> Result<()> {
        let payload = serde_json::to_string(document)?;

        if self.supports_json.load(Ordering::Relaxed) {
            let mut conn = self.conn.clone();
            let res: std::result::Result<(), redis::RedisError> = redis::cmd("JSON.SET")
                .arg(key)
                .arg("$")
                .arg(&payload)
                .query_async(&mut conn)
                .await;
            match res {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let msg = e.to_string();
                    if msg.contains("unknown command") {
                        self.supports_json.store(false, Ordering::Relaxed);
                        tracing::warn!(
                            key = key,
                            "JSON module not available; falling back to string documents"
                        );
                    } else {
                        return Err(ImportError::from(e));
                    }
                }
            }
        }

        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
