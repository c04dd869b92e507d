//! Filesystem-backed JSON storage for sessions and memory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// JSON documents addressed by key segments under a root directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a storage instance at the default data directory.
    ///
    /// # Errors
    ///
    /// Returns error if data directory cannot be determined.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_root(Config::data_dir()?))
    }

    /// Create a storage instance at a custom location.
    #[must_use]
    pub const fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Build a path from key segments.
    fn path(&self, key: &[&str]) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key {
            path.push(segment);
        }
        path.set_extension("json");
        path
    }

    /// Read a value from storage.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or cannot be parsed.
    pub fn read<T>(&self, key: &[&str]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = self.path(key);

        if !path.exists() {
            return Err(StorageError::NotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write a value to storage.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be written.
    pub fn write<T>(&self, key: &[&str], value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let path = self.path(key);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// List the keys directly under a prefix, without the `.json` extension.
    ///
    /// # Errors
    ///
    /// Returns error if directory cannot be read.
    pub fn list(&self, prefix: &[&str]) -> Result<Vec<String>> {
        let mut dir = self.root.clone();
        for segment in prefix {
            dir.push(segment);
        }

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// List and deserialize every readable document under a prefix.
    ///
    /// Unreadable documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the prefix directory cannot be read.
    pub fn list_prefix<T>(&self, prefix: &str) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut items = Vec::new();
        for key in self.list(&[prefix])? {
            match self.read(&[prefix, &key]) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable document"),
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
pub(crate) fn temp_storage() -> (Storage, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::with_root(dir.path().to_path_buf());
    (storage, dir)
}
