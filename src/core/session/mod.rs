//! Session persistence.
//!
//! A session captures everything needed to pick a conversation back up:
//! history, approval mode, working directory, counters, and memory.

mod export;

use std::path::{Path, PathBuf};

use agent_core::conversation::Conversation;
use agent_core::permission::PermissionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub use export::{default_export_name, format_as_markdown};

use super::memory::MemoryStore;
use super::storage::{Storage, StorageError};

const SESSIONS_PREFIX: &str = "sessions";

/// Generate a new session ID.
#[must_use]
pub fn new_session_id() -> String {
    format!("ses_{}", Ulid::new())
}

/// A saved conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,

    /// Working directory at save time.
    pub working_directory: PathBuf,

    /// Approval mode at save time.
    pub mode: PermissionMode,

    /// Full history, system turn included.
    pub history: Conversation,

    /// Latest reported token count.
    pub token_count: u32,

    /// Running cost estimate.
    pub cost_estimate: f64,

    /// Memory facts at save time.
    #[serde(default)]
    pub memory: MemoryStore,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Session {
    /// Create an empty session rooted at `working_directory`.
    #[must_use]
    pub fn new(working_directory: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: new_session_id(),
            working_directory,
            mode: PermissionMode::default(),
            history: Conversation::new(),
            token_count: 0,
            cost_estimate: 0.0,
            memory: MemoryStore::default(),
            created: now,
            updated: now,
        }
    }

    /// Number of non-system messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.history.len() - usize::from(self.history.system().is_some())
    }
}

/// Session manager for save/load/list.
#[derive(Debug, Clone)]
pub struct SessionManager {
    storage: Storage,
}

impl SessionManager {
    /// Create a new session manager.
    #[must_use]
    pub const fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Save a session, bumping its `updated` timestamp.
    ///
    /// # Errors
    ///
    /// Returns error if storage write fails.
    pub fn save(&self, session: &mut Session) -> Result<(), StorageError> {
        session.updated = Utc::now();
        self.storage.write(&[SESSIONS_PREFIX, &session.id], session)?;
        tracing::info!(id = %session.id, messages = session.message_count(), "saved session");
        Ok(())
    }

    /// Load a session by ID.
    ///
    /// # Errors
    ///
    /// Returns error if session not found or unreadable.
    pub fn load(&self, id: &str) -> Result<Session, StorageError> {
        self.storage.read(&[SESSIONS_PREFIX, id])
    }

    /// List all sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the sessions directory can't be read.
    pub fn list(&self) -> Result<Vec<Session>, StorageError> {
        let mut sessions: Vec<Session> = self.storage.list_prefix(SESSIONS_PREFIX)?;
        sessions.sort_by(|a, b| b.updated.cmp(&a.updated));
        Ok(sessions)
    }

    /// Most recently updated session saved from `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if the sessions directory can't be read.
    pub fn most_recent_for(&self, dir: &Path) -> Result<Option<Session>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|s| s.working_directory == dir))
    }
}
