use serde_json::Value;
use std::path::Path;

use crate::models::*;

/// Default key for a file-based record: the file name with the known
/// document suffixes stripped.
pub fn filename_key(file_path: &str) -> String {
    let name = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path);
    if let Some(stripped) = name.strip_suffix(".json.gz") {
        stripped.to_string()
    } else if let Some(stripped) = name.strip_suffix(".json") {
        stripped.to_string()
    } else {
        name.to_string()
    }
}

/// Compute the store key for one record.
///
/// An id-field path, when configured, is looked up in the transformed
/// document (dot-separated for nested fields) and must resolve to a
/// non-empty scalar; otherwise the record's fallback key (filename- or
/// row-derived) is used. An optional prefix is prepended either way.
pub fn derive_key(
    content: &Value,
    id_field: Option<&str>,
    key_prefix: Option<&str>,
    fallback_key: &str,
) -> Result<String> {
    let key = match id_field.filter(|f| !f.is_empty()) {
        Some(field) => scalar_at_path(content, field).ok_or_else(|| {
            ImportError::KeyDerivation(format!(
                "id field '{}' is missing or empty in the transformed document",
                field
            ))
        })?,
        None => fallback_key.to_string(),
    };

    match key_prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => Ok(format!("{}{}", prefix, key)),
        None => Ok(key),
    }
}

fn scalar_at_path(content: &Value, dotted_path: &str) -> Option<String> {
    let mut current = content;
    for segment in dotted_path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
