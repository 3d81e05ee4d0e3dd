use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::models::*;

/// Callback surface the engine notifies after every record and on every
/// status change. All methods default to no-ops so a headless run needs no
/// observer; implementations must never block the pipeline.
pub trait ProgressSink: Send + Sync {
    fn on_stats(&self, _stats: &ImportStats) {}
    fn on_record_error(&self, _error: &RecordError) {}
    fn on_status_change(&self, _status: ImportStatus) {}
}

pub struct NoopSink;

impl ProgressSink for NoopSink {}

/// The semantic progress events carried to a remote observer. The delivery
/// encoding is the transport layer's concern.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    Stats { stats: ImportStats },
    RecordError { error: RecordError },
    Status { status: ImportStatus },
}

/// Sink forwarding events to a broadcast channel. Sends are non-blocking
/// and a missing observer is not an error.
pub struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for BroadcastSink {
    fn on_stats(&self, stats: &ImportStats) {
        let _ = self.tx.send(ProgressEvent::Stats { stats: stats.clone() });
    }

    fn on_record_error(&self, error: &RecordError) {
        let _ = self.tx.send(ProgressEvent::RecordError { error: error.clone() });
    }

    fn on_status_change(&self, status: ImportStatus) {
        let _ = self.tx.send(ProgressEvent::Status { status });
    }
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-session event channels, keyed by session id. The hub is shared
/// between the request layer (subscribers) and running imports (senders).
#[derive(Default)]
pub struct EventHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self, session_id: &str) -> broadcast::Sender<ProgressEvent> {
        let mut channels = self.channels.lock().expect("event hub mutex poisoned");
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        self.sender(session_id).subscribe()
    }

    pub fn remove(&self, session_id: &str) {
        let mut channels = self.channels.lock().expect("event hub mutex poisoned");
        channels.remove(session_id);
    }
}
