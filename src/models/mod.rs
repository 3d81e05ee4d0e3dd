pub mod session;

pub use session::*;
use serde::{Deserialize, Serialize};

/// Where the records of an import come from.
///
/// `Folder` expands to the fixed glob pair `**/*.json` + `**/*.json.gz`
/// under the given path. `JsonArray` and `Csv` are single-file sources whose
/// rows are enumerated up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceSpec {
    Folder {
        path: String,
    },
    JsonArray {
        path: String,
    },
    Csv {
        path: String,
        delimiter: char,
        has_headers: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    NotStarted,
    InProgress,
    Success,
    PartialSuccess,
    ErrorStopped,
    Paused,
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImportStatus::NotStarted => "NOT_STARTED",
            ImportStatus::InProgress => "IN_PROGRESS",
            ImportStatus::Success => "SUCCESS",
            ImportStatus::PartialSuccess => "PARTIAL_SUCCESS",
            ImportStatus::ErrorStopped => "ERROR_STOPPED",
            ImportStatus::Paused => "PAUSED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_records: u64,
    pub processed: u64,
    pub failed: u64,
    pub total_time_ms: u64,
}

/// One record-level failure, reported individually in addition to the
/// aggregate counts so partial success stays diagnosable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub path: String,
    pub error: String,
}

// --- request / response shapes (camelCase on the wire, like the host UI expects) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartImportInput {
    pub store_url: String,
    pub source: SourceSpec,
    pub session_id: Option<String>,
    pub id_field: Option<String>,
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub stop_on_error: bool,
    pub transform_script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeImportInput {
    pub session_id: String,
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionInput {
    pub store_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTransformInput {
    pub transform_script: String,
    pub sample: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecordInput {
    pub source: SourceSpec,
}

/// Returned by start/resume once the run stops for any reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub session_id: String,
    pub stats: ImportStats,
    pub errors: Vec<RecordError>,
    pub status: ImportStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub path: String,
    pub content: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("unsafe transform script: {0}")]
    UnsafeScript(String),

    #[error("transform script rejected: {0}")]
    ScriptParse(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("store connection error: {0}")]
    StoreConnection(String),

    #[error("import already running for session '{0}'")]
    AlreadyRunning(String),

    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for ImportError {
    fn from(e: redis::RedisError) -> Self {
        ImportError::StoreConnection(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
