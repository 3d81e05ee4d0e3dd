use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::models::SessionState;

pub type SharedSession = Arc<AsyncMutex<SessionState>>;

/// Process-wide map from session id to session state, enabling resume.
/// An explicit object handed to the request layer by reference; entries are
/// evicted by the TTL sweep, never by a running import.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SharedSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        let sessions = self.inner.lock().expect("session registry mutex poisoned");
        sessions.get(session_id).cloned()
    }

    pub fn get_or_create(&self, session_id: &str) -> SharedSession {
        let mut sessions = self.inner.lock().expect("session registry mutex poisoned");
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(SessionState::new(session_id))))
            .clone()
    }

    pub fn remove(&self, session_id: &str) -> Option<SharedSession> {
        let mut sessions = self.inner.lock().expect("session registry mutex poisoned");
        sessions.remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict sessions idle for longer than `ttl`. A session that is running
    /// or currently locked by a run is left alone.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;

        let candidates: Vec<(String, SharedSession)> = {
            let sessions = self.inner.lock().expect("session registry mutex poisoned");
            sessions.iter().map(|(id, s)| (id.clone(), s.clone())).collect()
        };

        let mut evicted = 0;
        for (id, session) in candidates {
            let expendable = match session.try_lock() {
                Ok(state) => !state.is_running() && state.updated_at < cutoff,
                Err(_) => false,
            };
            if expendable {
                let mut sessions = self.inner.lock().expect("session registry mutex poisoned");
                sessions.remove(&id);
                evicted += 1;
                tracing::info!(session_id = %id, "Evicted idle session");
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImportStatus;

    #[test]
    fn get_or_create_returns_the_same_entry() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("s1");
        let b = registry.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn evicts_only_idle_sessions_past_the_ttl() {
        let registry = SessionRegistry::new();

        let stale = registry.get_or_create("stale");
        {
            let mut state = stale.try_lock().unwrap();
            state.updated_at = Utc::now() - Duration::hours(2);
        }

        let fresh = registry.get_or_create("fresh");
        drop(fresh);

        let running = registry.get_or_create("running");
        {
            let mut state = running.try_lock().unwrap();
            state.status = ImportStatus::InProgress;
            state.updated_at = Utc::now() - Duration::hours(2);
        }

        let evicted = registry.evict_idle(Duration::hours(1));
        assert_eq!(evicted, 1);
        assert!(registry.get("stale").is_none());
        assert!(registry.get("fresh").is_some());
        assert!(registry.get("running").is_some());
    }
}
