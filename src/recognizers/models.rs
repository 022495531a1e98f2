//! Download-once cache for OCR model and training files

use crate::error::ScanError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Cache directory shared by all OCR engines
pub fn cache_dir(subdir: Option<&str>) -> Result<PathBuf, ScanError> {
    let mut dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("serial-scan");
    if let Some(subdir) = subdir {
        dir = dir.join(subdir);
    }

    std::fs::create_dir_all(&dir).map_err(|e| {
        ScanError::RecognizerUnavailable(format!("Failed to create cache directory: {}", e))
    })?;

    Ok(dir)
}

/// Ensure a file is present in `dir`, downloading it from `url` if needed
pub fn ensure_downloaded(dir: &Path, url: &str, filename: &str) -> Result<PathBuf, ScanError> {
    let path = dir.join(filename);

    if !path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &path)?;
        tracing::info!("Downloaded {} to {:?}", filename, path);
    } else {
        tracing::info!("Using cached {} from {:?}", filename, dir);
    }

    Ok(path)
}

/// Download a file from URL to path using ureq
fn download_file(url: &str, path: &Path) -> Result<(), ScanError> {
    let response = ureq::get(url).call().map_err(|e| {
        ScanError::RecognizerUnavailable(format!("Failed to download {}: {}", url, e))
    })?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        ScanError::RecognizerUnavailable(format!("Failed to read response body: {}", e))
    })?;

    // A partial download must never appear under the final name
    let partial = path.with_extension("part");
    let mut file = File::create(&partial).map_err(|e| {
        ScanError::RecognizerUnavailable(format!("Failed to create {:?}: {}", partial, e))
    })?;
    file.write_all(&buffer).map_err(|e| {
        ScanError::RecognizerUnavailable(format!("Failed to write {:?}: {}", partial, e))
    })?;
    std::fs::rename(&partial, path).map_err(|e| {
        ScanError::RecognizerUnavailable(format!("Failed to move {:?} into place: {}", path, e))
    })?;

    Ok(())
}
