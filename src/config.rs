use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Interpreter operation budget per transform invocation.
    pub sandbox_max_operations: u64,
    /// Idle sessions older than this are evicted by the sweep job.
    pub session_ttl_secs: u64,
    pub enable_session_eviction: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let get = |k: &str| std::env::var(k).ok();

        let port: u16 = get("PORT").and_then(|s| s.parse().ok()).unwrap_or(8086);
        let sandbox_max_operations: u64 = get("SANDBOX_MAX_OPERATIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(500_000);
        let session_ttl_secs: u64 = get("SESSION_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);
        let enable_session_eviction: bool = get("ENABLE_SESSION_EVICTION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Self {
            port,
            sandbox_max_operations,
            session_ttl_secs,
            enable_session_eviction,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8086,
            sandbox_max_operations: 500_000,
            session_ttl_secs: 3600,
            enable_session_eviction: true,
        }
    }
}
