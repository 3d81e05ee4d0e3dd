use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::*;
use crate::source::RecordList;

/// In-memory state of one resumable import run, addressed by an external
/// session id. Survives pause and error-stop so a later resume can pick up
/// from the cursor; destroyed only by registry eviction.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    /// The request that started the run; kept whole so resume reuses the
    /// same source, key rule, and transform script.
    pub input: Option<StartImportInput>,
    pub status: ImportStatus,
    /// Index of the last record attempted. Monotonic within a run.
    pub cursor: usize,
    pub stats: ImportStats,
    pub errors: Vec<RecordError>,
    /// Cooperative pause request, observed between records only.
    pub paused: bool,
    /// Enumerated record list, computed once at session start and retained
    /// across pause so resume indexes into the same ordering.
    pub records: Option<Arc<RecordList>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            input: None,
            status: ImportStatus::NotStarted,
            cursor: 0,
            stats: ImportStats::default(),
            errors: Vec::new(),
            paused: false,
            records: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset the session for a fresh run over a newly enumerated record
    /// list. `totalRecords` is fixed here and never revised mid-run.
    pub fn begin_run(&mut self, input: StartImportInput, records: Arc<RecordList>) {
        self.stats = ImportStats {
            total_records: records.len() as u64,
            ..ImportStats::default()
        };
        self.errors.clear();
        self.cursor = 0;
        self.paused = false;
        self.input = Some(input);
        self.records = Some(records);
        self.status = ImportStatus::InProgress;
        self.touch();
    }

    /// Re-enter `IN_PROGRESS` and return the index to resume from.
    ///
    /// A paused run continues at the record after the cursor (pausing is a
    /// clean boundary); an error-stopped run retries the cursor record (it
    /// was never completed). The retried record's earlier failure is
    /// superseded by the retry, keeping `processed + failed` within the
    /// total.
    pub fn resume_run(&mut self, stop_on_error: bool) -> usize {
        let next = match self.status {
            ImportStatus::Paused => self.cursor + 1,
            ImportStatus::ErrorStopped => {
                self.stats.failed = self.stats.failed.saturating_sub(1);
                self.errors.pop();
                self.cursor
            }
            _ => self.cursor,
        };
        if let Some(input) = self.input.as_mut() {
            input.stop_on_error = stop_on_error;
        }
        self.paused = false;
        self.status = ImportStatus::InProgress;
        self.touch();
        next
    }

    /// Account for one attempted record and advance the cursor.
    pub fn record_done(&mut self, ordinal: usize, error: Option<RecordError>) {
        self.cursor = ordinal;
        match error {
            Some(err) => {
                self.stats.failed += 1;
                self.errors.push(err);
            }
            None => self.stats.processed += 1,
        }
        self.touch();
    }

    pub fn stop_with(&mut self, status: ImportStatus) {
        self.status = status;
        self.touch();
    }

    /// Record the run duration and settle a still-running status into its
    /// terminal form: all records processed means `SUCCESS`, anything less
    /// is `PARTIAL_SUCCESS`. Statuses set inside the loop (paused,
    /// error-stopped) are left alone.
    pub fn finalize_run(&mut self, elapsed_ms: u64) {
        self.stats.total_time_ms = elapsed_ms;
        if self.status == ImportStatus::InProgress {
            self.status = if self.stats.processed == self.stats.total_records {
                ImportStatus::Success
            } else {
                ImportStatus::PartialSuccess
            };
        }
        self.touch();
    }

    pub fn outcome(&self) -> ImportOutcome {
        ImportOutcome {
            session_id: self.session_id.clone(),
            stats: self.stats.clone(),
            errors: self.errors.clone(),
            status: self.status,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ImportStatus::InProgress
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
