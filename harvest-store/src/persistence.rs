//! File persistence helpers.
//!
//! Every state file is JSON, written atomically (temp file + rename) so a
//! crash mid-write leaves the previous version intact.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

// ============================================================================
// Default Paths
// ============================================================================

/// Returns the default data directory.
///
/// - macOS: `~/Library/Application Support/harvest`
/// - Linux: `~/.local/share/harvest`
/// - Windows: `%LOCALAPPDATA%\harvest`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("harvest"))
        .unwrap_or_else(|| PathBuf::from(".harvest"))
}

/// Returns the default checkpoint directory.
pub fn default_checkpoint_dir() -> PathBuf {
    default_data_dir().join("checkpoints")
}

/// Returns the default metadata registry path.
pub fn default_metadata_path() -> PathBuf {
    default_data_dir().join("extraction_metadata.json")
}

/// Maps an identifier onto a file stem that cannot escape its directory.
///
/// The mapping is form-urlencoding, so it is injective: distinct ids never
/// share a file. ASCII alphanumerics and `*-._` pass through unchanged.
pub fn safe_file_stem(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }
    url::form_urlencoded::byte_serialize(id.as_bytes()).collect()
}

// ============================================================================
// File Operations
// ============================================================================

/// Saves data to a JSON file, replacing any previous content.
///
/// Creates parent directories if they don't exist and writes atomically
/// (via temp file + rename).
pub async fn save_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), StoreError> {
    debug!(path = %path.display(), "Saving JSON file");

    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let json = serde_json::to_string_pretty(data)?;

    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &json).await?;
    tokio::fs::rename(&temp_path, path).await?;

    debug!(path = %path.display(), bytes = json.len(), "JSON file saved");
    Ok(())
}

/// Loads data from a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    debug!(path = %path.display(), "Loading JSON file");

    let content = tokio::fs::read_to_string(path).await?;
    let data = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    debug!(path = %path.display(), "JSON file loaded");
    Ok(data)
}

/// Loads data from a JSON file, returning `None` if the file does not exist.
pub async fn load_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match load_json(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes a file; returns whether it existed.
pub async fn remove_file(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed file");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Ensures a directory exists.
pub async fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    if !tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "Creating directory");
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
