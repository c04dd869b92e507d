//! Persistent key/value memory carried across sessions.
//!
//! Facts are kept in insertion order so the system prompt and `/memory`
//! listings are deterministic.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::storage::{Storage, StorageError};

const MEMORY_KEY: &str = "memory";

/// Ordered map of remembered facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore(IndexMap<String, String>);

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a fact. Updating keeps the original position.
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a fact, returning its value.
    pub fn forget(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    /// Look up a fact.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate facts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render facts as `- key: value` lines for the system prompt.
    #[must_use]
    pub fn to_prompt_lines(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Loads and saves the memory store.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    storage: Storage,
}

impl MemoryManager {
    /// Create a memory manager over `storage`.
    #[must_use]
    pub const fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Load the store, empty if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns error if the stored file exists but can't be read.
    pub fn load(&self) -> Result<MemoryStore, StorageError> {
        match self.storage.read(&[MEMORY_KEY]) {
            Ok(store) => Ok(store),
            Err(StorageError::NotFound(_)) => Ok(MemoryStore::default()),
            Err(e) => Err(e),
        }
    }

    /// Save the store.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn save(&self, store: &MemoryStore) -> Result<(), StorageError> {
        self.storage.write(&[MEMORY_KEY], store)?;
        tracing::debug!(facts = store.len(), "saved memory");
        Ok(())
    }
}
