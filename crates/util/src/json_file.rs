//! Load/save helpers shared by the JSON-backed stores.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure while reading or writing a store file.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read a store file. A missing file is empty.
///
/// An unparsable file is renamed to `<name>.corrupt-<timestamp>` before the
/// store starts empty, so the next save cannot destroy it.
pub(crate) fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(file) => Ok(file),
            Err(error) => {
                let backup = set_aside(path)?;
                warn!(
                    "Failed to parse store file at {}: {}; moved it to {} and starting empty",
                    path.display(),
                    error,
                    backup.display()
                );
                Ok(T::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(error) => Err(StoreError::Io(error)),
    }
}

fn set_aside(path: &Path) -> Result<PathBuf, StoreError> {
    let mut backup = path.as_os_str().to_owned();
    backup.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.f")));
    let backup = PathBuf::from(backup);
    fs::rename(path, &backup)?;
    Ok(backup)
}

/// Write a store file via a sibling temp file and rename, so readers never see a torn write.
pub(crate) fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
