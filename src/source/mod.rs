pub mod reader;

pub use reader::*;

use csv::ReaderBuilder;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::*;

/// The ordered record list of one import run. Computed once at session
/// start; resume indexes into it, so the ordering must be stable and
/// reproducible for the same inputs.
#[derive(Debug)]
pub enum RecordList {
    /// One document per file, read lazily per record.
    Files(Vec<PathBuf>),
    /// Array/CSV rows, materialized at enumeration time so an arbitrary
    /// resume offset is random access and never re-reads prior records.
    Rows(Vec<RowRecord>),
}

#[derive(Debug, Clone)]
pub struct RowRecord {
    pub label: String,
    pub fallback_key: String,
    pub content: Option<Value>,
    pub error: Option<String>,
}

impl RecordList {
    pub fn len(&self) -> usize {
        match self {
            RecordList::Files(paths) => paths.len(),
            RecordList::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The fixed glob pair a folder source expands to.
pub fn json_globs(folder_path: &str) -> [String; 2] {
    let mut base = folder_path.replace('\\', "/");
    if !base.ends_with('/') {
        base.push('/');
    }
    [format!("{}**/*.json", base), format!("{}**/*.json.gz", base)]
}

/// Expand a source spec into the ordered record list.
///
/// Fatal (`InvalidSourceError`) when the folder/file does not exist or no
/// candidate records match; a single malformed CSV row is captured as a
/// row-level error instead.
pub fn expand_source(spec: &SourceSpec) -> Result<RecordList> {
    match spec {
        SourceSpec::Folder { path } => expand_folder(path),
        SourceSpec::JsonArray { path } => expand_json_array(path),
        SourceSpec::Csv { path, delimiter, has_headers } => {
            expand_csv(path, *delimiter, *has_headers)
        }
    }
}

fn expand_folder(folder_path: &str) -> Result<RecordList> {
    let root = Path::new(folder_path);
    if !root.is_dir() {
        return Err(ImportError::InvalidSource(format!(
            "folder does not exist: {}",
            folder_path
        )));
    }

    let globs = json_globs(folder_path);
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_document_suffix(p))
        .collect();
    // Lexicographic order keeps resume cursors valid across calls.
    paths.sort();

    if paths.is_empty() {
        return Err(ImportError::InvalidSource(format!(
            "no files match {} or {}",
            globs[0], globs[1]
        )));
    }

    tracing::debug!(
        folder = folder_path,
        file_count = paths.len(),
        "Expanded folder source"
    );

    Ok(RecordList::Files(paths))
}

fn has_document_suffix(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json") || name.ends_with(".json.gz")
}

fn expand_json_array(file_path: &str) -> Result<RecordList> {
    let bytes = std::fs::read(file_path).map_err(|e| {
        ImportError::InvalidSource(format!("cannot read {}: {}", file_path, e))
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
        ImportError::InvalidSource(format!("{} is not valid JSON: {}", file_path, e))
    })?;
    let items = value.as_array().ok_or_else(|| {
        ImportError::InvalidSource(format!("{} does not contain a JSON array", file_path))
    })?;
    if items.is_empty() {
        return Err(ImportError::InvalidSource(format!(
            "{} contains an empty array",
            file_path
        )));
    }

    let stem = file_stem(file_path);
    let rows = items
        .iter()
        .enumerate()
        .map(|(i, item)| RowRecord {
            label: format!("{}[{}]", file_path, i),
            fallback_key: format!("{}:{}", stem, i),
            content: Some(item.clone()),
            error: None,
        })
        .collect();

    tracing::debug!(file = file_path, record_count = items.len(), "Expanded array source");

    Ok(RecordList::Rows(rows))
}

fn expand_csv(file_path: &str, delimiter: char, has_headers: bool) -> Result<RecordList> {
    let text = std::fs::read_to_string(file_path).map_err(|e| {
        ImportError::InvalidSource(format!("cannot read {}: {}", file_path, e))
    })?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(has_headers)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers = if has_headers {
        reader
            .headers()
            .map_err(|e| ImportError::InvalidSource(format!("bad CSV header: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
    } else {
        // Generate generic column names from the first record's width.
        let first = reader.records().next().transpose().map_err(|e| {
            ImportError::InvalidSource(format!("unreadable CSV: {}", e))
        })?;
        match first {
            Some(record) => (0..record.len()).map(|i| format!("column_{}", i)).collect(),
            None => {
                return Err(ImportError::InvalidSource(format!(
                    "{} contains no rows",
                    file_path
                )))
            }
        }
    };

    // Reset the reader if a record was consumed to size the headers.
    if !has_headers {
        reader = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(false)
            .flexible(false)
            .from_reader(text.as_bytes());
    }

    let stem = file_stem(file_path);
    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let label = format!("{}:{}", file_path, i);
        let fallback_key = format!("{}:{}", stem, i);
        match result {
            Ok(record) => {
                let mut json_record = serde_json::Map::new();
                for (col, field) in record.iter().enumerate() {
                    if let Some(header) = headers.get(col) {
                        json_record.insert(header.clone(), Value::String(field.to_string()));
                    }
                }
                rows.push(RowRecord {
                    label,
                    fallback_key,
                    content: Some(Value::Object(json_record)),
                    error: None,
                });
            }
            Err(e) => rows.push(RowRecord {
                label,
                fallback_key,
                content: None,
                error: Some(format!("CSV parse error: {}", e)),
            }),
        }
    }

    if rows.is_empty() {
        return Err(ImportError::InvalidSource(format!(
            "{} contains no rows",
            file_path
        )));
    }

    tracing::debug!(file = file_path, record_count = rows.len(), "Expanded CSV source");

    Ok(RecordList::Rows(rows))
}

fn file_stem(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_path)
        .to_string()
}
