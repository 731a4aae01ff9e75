//! Storage Module
//!
//! Durable key/value storage backed by one JSON file per key.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// File-backed key/value storage
#[derive(Debug, Clone)]
pub struct FileStorage {
    storage_path: PathBuf,
}

impl FileStorage {
    /// Create storage under the platform's local data directory
    pub fn new() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("WhereAreYou");

        Self::at(storage_path)
    }

    /// Create storage rooted at an explicit directory
    pub fn at(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();

        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }

        debug!("Storage initialized at: {:?}", storage_path);

        Self { storage_path }
    }

    /// Serialize and write a value.
    ///
    /// The file is written to a sibling temp file and renamed into place, so a
    /// concurrent `load` sees either the previous value or the new one.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let file_path = self.file_path(key);
        let tmp_path = self.storage_path.join(format!("{}.json.tmp", key));

        std::fs::write(&tmp_path, json)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, &file_path)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Saved data for key: {}", key);
        Ok(())
    }

    /// Read and deserialize a value
    pub fn load<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T, StorageError> {
        let file_path = self.file_path(key);

        let bytes = match std::fs::read(&file_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Delete stored data
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let file_path = self.file_path(key);

        if file_path.exists() {
            std::fs::remove_file(&file_path)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            info!("Deleted stored data for key: {}", key);
        }

        Ok(())
    }

    /// Check if key exists
    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{}.json", key))
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No stored data for key: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
