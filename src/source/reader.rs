use serde_json::Value;
use std::io::Read;
use std::path::Path;

use crate::keys::filename_key;
use crate::source::RecordList;

/// One record as handed to the pipeline. Parse and I/O failures live in
/// `error` rather than aborting the run, because the session decides (via
/// stop-on-error) whether to continue past a bad record.
#[derive(Debug, Clone)]
pub struct RecordData {
    pub ordinal: usize,
    pub path: String,
    pub fallback_key: String,
    pub content: Option<Value>,
    pub error: Option<String>,
}

impl RecordData {
    fn failed(ordinal: usize, path: String, fallback_key: String, error: String) -> Self {
        Self { ordinal, path, fallback_key, content: None, error: Some(error) }
    }
}

/// Read the record at `ordinal`. Never errors for malformed single-record
/// content; the failure is captured in the returned record.
pub async fn read_record(records: &RecordList, ordinal: usize) -> RecordData {
    match records {
        RecordList::Files(paths) => match paths.get(ordinal) {
            Some(path) => read_document_file(path, ordinal).await,
            None => RecordData::failed(
                ordinal,
                format!("#{}", ordinal),
                format!("{}", ordinal),
                "record ordinal out of range".to_string(),
            ),
        },
        RecordList::Rows(rows) => match rows.get(ordinal) {
            Some(row) => RecordData {
                ordinal,
                path: row.label.clone(),
                fallback_key: row.fallback_key.clone(),
                content: row.content.clone(),
                error: row.error.clone(),
            },
            None => RecordData::failed(
                ordinal,
                format!("#{}", ordinal),
                format!("{}", ordinal),
                "record ordinal out of range".to_string(),
            ),
        },
    }
}

async fn read_document_file(path: &Path, ordinal: usize) -> RecordData {
    let display = path.display().to_string();
    let fallback_key = filename_key(&display);
    let is_gz = display.ends_with(".json.gz");

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return RecordData::failed(ordinal, display, fallback_key, format!("read failed: {}", e)),
    };

    let text = if is_gz {
        let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut out = String::new();
        match decoder.read_to_string(&mut out) {
            Ok(_) => out,
            Err(e) => {
                return RecordData::failed(
                    ordinal,
                    display,
                    fallback_key,
                    format!("gzip decode failed: {}", e),
                )
            }
        }
    } else {
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                return RecordData::failed(
                    ordinal,
                    display,
                    fallback_key,
                    format!("file is not UTF-8: {}", e),
                )
            }
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(content) => RecordData {
            ordinal,
            path: display,
            fallback_key,
            content: Some(content),
            error: None,
        },
        Err(e) => RecordData::failed(ordinal, display, fallback_key, format!("JSON parse failed: {}", e)),
    }
}
