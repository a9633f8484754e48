//! Whole-file JSON persistence
//!
//! Stores are rewritten in full on every mutation. Writes go to a temporary
//! file in the destination directory and are renamed over the target, so a
//! reader never observes a half-written file.

use crate::error::OcrError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Read and deserialize a JSON document, `None` if the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, OcrError> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(path)
        .map_err(|e| OcrError::Persistence(format!("Failed to read {:?}: {}", path, e)))?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| OcrError::Persistence(format!("Failed to parse {:?}: {}", path, e)))?;

    Ok(Some(value))
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), OcrError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir).map_err(|e| {
        OcrError::Persistence(format!("Failed to create directory {:?}: {}", dir, e))
    })?;

    let serialized = serde_json::to_vec_pretty(value)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".tmp-")
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(|e| OcrError::Persistence(format!("Failed to create temp file: {}", e)))?;

    temp_file
        .write_all(&serialized)
        .and_then(|_| temp_file.as_file().sync_all())
        .map_err(|e| OcrError::Persistence(format!("Failed to write temp file: {}", e)))?;

    temp_file.persist(path).map_err(|e| {
        OcrError::Persistence(format!("Failed to replace {:?}: {}", path, e.error))
    })?;

    Ok(())
}
