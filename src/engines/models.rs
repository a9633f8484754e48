//! Download cache for engine model files

use crate::error::OcrError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Cache directory shared by all engines
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ocr-review")
}

/// Return `dir/filename`, downloading it from `url` first if absent
pub fn ensure_cached(url: &str, dir: &Path, filename: &str) -> Result<PathBuf, OcrError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        OcrError::InitializationError(format!("Failed to create cache directory {:?}: {}", dir, e))
    })?;

    let path = dir.join(filename);
    if path.exists() {
        tracing::info!("Using cached {} from {:?}", filename, path);
        return Ok(path);
    }

    tracing::info!("Downloading {} (this may take a moment)...", filename);
    download(url, dir, &path)?;
    tracing::info!("Downloaded {} to {:?}", filename, path);

    Ok(path)
}

// Writes to a temp file first so an interrupted download is never cached
fn download(url: &str, dir: &Path, path: &Path) -> Result<(), OcrError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| OcrError::InitializationError(format!("Failed to download {}: {}", url, e)))?;

    let body = response.into_body().read_to_vec().map_err(|e| {
        OcrError::InitializationError(format!("Failed to read response from {}: {}", url, e))
    })?;

    let mut partial = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        OcrError::InitializationError(format!("Failed to create download file: {}", e))
    })?;
    partial
        .write_all(&body)
        .map_err(|e| OcrError::InitializationError(format!("Failed to write download: {}", e)))?;
    partial.persist(path).map_err(|e| {
        OcrError::InitializationError(format!("Failed to store {:?}: {}", path, e.error))
    })?;

    Ok(())
}
