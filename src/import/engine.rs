use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::keys::derive_key;
use crate::models::*;
use crate::progress::ProgressSink;
use crate::registry::{SessionRegistry, SharedSession};
use crate::sandbox::TransformSandbox;
use crate::source::{expand_source, read_record, RecordData};
use crate::store::{DocumentStore, RedisStoreFactory, StoreFactory};

/// The import orchestrator: sequences expansion → read → transform → key →
/// upsert for each record, strictly one at a time, and owns the session
/// transitions. One instance serves the whole process; concurrent sessions
/// under different ids run independently.
pub struct ImportEngine {
    registry: SessionRegistry,
    store_factory: Arc<dyn StoreFactory>,
    cfg: Config,
    active_runs: Arc<Mutex<HashSet<String>>>,
}

/// Single-flight lock per session id, released on drop so a panicking or
/// failing run never wedges the session.
struct ActiveRunGuard {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl ImportEngine {
    pub fn new(registry: SessionRegistry, cfg: Config) -> Self {
        Self::with_store_factory(registry, cfg, Arc::new(RedisStoreFactory))
    }

    pub fn with_store_factory(
        registry: SessionRegistry,
        cfg: Config,
        store_factory: Arc<dyn StoreFactory>,
    ) -> Self {
        Self {
            registry,
            store_factory,
            cfg,
            active_runs: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Open a connection to the target and round-trip a ping. Never creates
    /// a session.
    pub async fn test_connection(&self, input: TestConnectionInput) -> Result<String> {
        if input.store_url.trim().is_empty() {
            return Err(ImportError::Configuration("store URL is missing".to_string()));
        }
        let _store = self.store_factory.open(&input.store_url).await?;
        Ok("Connection to store successful".to_string())
    }

    /// Start a fresh run for the session id (generated when absent).
    ///
    /// Configuration and script validation failures surface before the
    /// session is created or mutated.
    pub async fn start_import(
        &self,
        input: StartImportInput,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ImportOutcome> {
        if input.store_url.trim().is_empty() {
            return Err(ImportError::Configuration("store URL is missing".to_string()));
        }
        let sandbox = self.compile_transform(input.transform_script.as_deref())?;
        let records = Arc::new(expand_source(&input.source)?);

        let session_id = input
            .session_id
            .clone()
            .unwrap_or_else(generate_session_id);
        let _guard = self.acquire_run(&session_id)?;

        let store = self.store_factory.open(&input.store_url).await?;

        let session = self.registry.get_or_create(&session_id);
        {
            let mut state = session.lock().await;
            state.begin_run(input, records);
        }
        sink.on_status_change(ImportStatus::InProgress);

        tracing::info!(session_id = %session_id, "Starting import run");
        self.run_records(&session, store.as_ref(), sandbox.as_ref(), sink.as_ref(), 0)
            .await?;

        let outcome = session.lock().await.outcome();
        Ok(outcome)
    }

    /// Resume a paused or error-stopped session. A paused run continues at
    /// the record after the cursor; an error-stopped run retries the cursor
    /// record.
    pub async fn resume_import(
        &self,
        input: ResumeImportInput,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ImportOutcome> {
        let session = self
            .registry
            .get(&input.session_id)
            .ok_or_else(|| ImportError::UnknownSession(input.session_id.clone()))?;
        let _guard = self.acquire_run(&input.session_id)?;

        // Inspect without mutating so a rejected resume leaves the session
        // untouched. Only paused and error-stopped runs are resumable.
        let run_input = {
            let state = session.lock().await;
            match state.status {
                ImportStatus::InProgress => {
                    return Err(ImportError::AlreadyRunning(input.session_id.clone()))
                }
                ImportStatus::Paused | ImportStatus::ErrorStopped => {}
                other => {
                    return Err(ImportError::Configuration(format!(
                        "session '{}' is {} and cannot be resumed",
                        input.session_id, other
                    )))
                }
            }
            if state.records.is_none() {
                return Err(ImportError::Configuration(format!(
                    "session '{}' has no run to resume",
                    input.session_id
                )));
            }
            state.input.clone().ok_or_else(|| {
                ImportError::Configuration(format!(
                    "session '{}' has no run to resume",
                    input.session_id
                ))
            })?
        };

        let sandbox = self.compile_transform(run_input.transform_script.as_deref())?;
        let store = self.store_factory.open(&run_input.store_url).await?;

        let start_index = {
            let mut state = session.lock().await;
            state.resume_run(input.stop_on_error)
        };
        sink.on_status_change(ImportStatus::InProgress);

        tracing::info!(
            session_id = %input.session_id,
            start_index = start_index,
            "Resuming import run"
        );
        self.run_records(
            &session,
            store.as_ref(),
            sandbox.as_ref(),
            sink.as_ref(),
            start_index,
        )
        .await?;

        let outcome = session.lock().await.outcome();
        Ok(outcome)
    }

    /// Request a cooperative pause. Observed between records only; an
    /// in-flight record always finishes first.
    pub async fn pause_import(&self, session_id: &str) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| ImportError::UnknownSession(session_id.to_string()))?;
        let mut state = session.lock().await;
        state.paused = true;
        tracing::info!(session_id = session_id, "Pause requested");
        Ok(())
    }

    /// Validate and run a transform against a sample document. Never opens
    /// a store connection and never creates a session.
    pub fn test_transform(&self, input: TestTransformInput) -> Result<serde_json::Value> {
        let sandbox =
            TransformSandbox::compile(&input.transform_script, self.cfg.sandbox_max_operations)?;
        let transformed = sandbox.apply(&input.sample)?;
        Ok(transformed.unwrap_or(serde_json::Value::Null))
    }

    /// Return the first record of a source for UI preview. No session is
    /// created; a failing first record fails the call.
    pub async fn sample_record(&self, input: SampleRecordInput) -> Result<SampleRecord> {
        let records = expand_source(&input.source)?;
        let record = read_record(&records, 0).await;
        if let Some(error) = record.error {
            return Err(ImportError::InvalidSource(format!(
                "{}: {}",
                record.path, error
            )));
        }
        Ok(SampleRecord {
            path: record.path,
            content: record.content.unwrap_or(serde_json::Value::Null),
        })
    }

    fn acquire_run(&self, session_id: &str) -> Result<ActiveRunGuard> {
        let mut active = self.active_runs.lock().expect("active runs mutex poisoned");
        if !active.insert(session_id.to_string()) {
            return Err(ImportError::AlreadyRunning(session_id.to_string()));
        }
        Ok(ActiveRunGuard {
            set: self.active_runs.clone(),
            id: session_id.to_string(),
        })
    }

    fn compile_transform(&self, script: Option<&str>) -> Result<Option<TransformSandbox>> {
        match script {
            Some(s) if !s.trim().is_empty() => Ok(Some(TransformSandbox::compile(
                s,
                self.cfg.sandbox_max_operations,
            )?)),
            _ => Ok(None),
        }
    }

    /// The record loop. Store failures propagate without touching the
    /// cursor or status (the failure is outside the record's accounting);
    /// everything record-level is captured into the session.
    async fn run_records(
        &self,
        session: &SharedSession,
        store: &dyn DocumentStore,
        sandbox: Option<&TransformSandbox>,
        sink: &dyn ProgressSink,
        start_index: usize,
    ) -> Result<()> {
        let started = Instant::now();

        let (records, run_input) = {
            let state = session.lock().await;
            (
                state.records.clone().expect("record list set at run start"),
                state.input.clone().expect("input set at run start"),
            )
        };
        let total = records.len();

        let mut index = start_index;
        while index < total {
            let record = read_record(&records, index).await;
            let mut record = self.transform_record(record, sandbox);

            if record.error.is_none() {
                if let Some(content) = &record.content {
                    match derive_key(
                        content,
                        run_input.id_field.as_deref(),
                        run_input.key_prefix.as_deref(),
                        &record.fallback_key,
                    ) {
                        Ok(key) => {
                            let report = store.upsert(&key, content).await?;
                            if report.existed {
                                tracing::info!(path = %record.path, key = %key, "Updated document");
                            } else {
                                tracing::info!(path = %record.path, key = %key, "Added document");
                            }
                        }
                        Err(e) => record.error = Some(e.to_string()),
                    }
                }
            }

            // Account for the record, then decide whether the loop stops:
            // a failing record under stop-on-error, or a pause observed at
            // this record boundary.
            let (stats, record_error, stop_status) = {
                let mut state = session.lock().await;
                let record_error = record.error.clone().map(|error| RecordError {
                    path: record.path.clone(),
                    error,
                });
                state.record_done(index, record_error.clone());

                let stop_on_error = state
                    .input
                    .as_ref()
                    .map(|i| i.stop_on_error)
                    .unwrap_or(false);
                let stop_status = if record_error.is_some() && stop_on_error {
                    state.stop_with(ImportStatus::ErrorStopped);
                    Some(ImportStatus::ErrorStopped)
                } else if state.paused {
                    state.stop_with(ImportStatus::Paused);
                    Some(ImportStatus::Paused)
                } else {
                    None
                };
                (state.stats.clone(), record_error, stop_status)
            };

            sink.on_stats(&stats);
            if let Some(error) = &record_error {
                tracing::warn!(path = %error.path, error = %error.error, "Record failed");
                sink.on_record_error(error);
            }
            if stop_status.is_some() {
                break;
            }
            index += 1;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (status, stats) = {
            let mut state = session.lock().await;
            state.finalize_run(elapsed_ms);
            (state.status, state.stats.clone())
        };
        sink.on_stats(&stats);
        sink.on_status_change(status);

        tracing::info!(
            status = %status,
            processed = stats.processed,
            failed = stats.failed,
            total = stats.total_records,
            elapsed_ms = elapsed_ms,
            "Import run stopped"
        );
        Ok(())
    }

    fn transform_record(
        &self,
        mut record: RecordData,
        sandbox: Option<&TransformSandbox>,
    ) -> RecordData {
        if record.error.is_some() {
            return record;
        }
        let (Some(sandbox), Some(content)) = (sandbox, record.content.as_ref()) else {
            return record;
        };
        match sandbox.apply(content) {
            Ok(Some(transformed)) => record.content = Some(transformed),
            // Unit return keeps the record's original content.
            Ok(None) => {}
            Err(e) => record.error = Some(e.to_string()),
        }
        record
    }
}
