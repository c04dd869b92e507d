//! Bounded ledger of pre-mutation file snapshots.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Default number of snapshots retained.
pub const DEFAULT_CAPACITY: usize = 20;

/// State of one file before a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    /// Absolute path of the mutated file.
    pub path: PathBuf,
    /// Bytes before the mutation, `None` if the file did not exist.
    pub prior: Option<Vec<u8>>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// What [`UndoLedger::undo_last`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The file had not existed and was removed.
    Removed(PathBuf),
    /// The prior content was written back.
    Restored(PathBuf),
    /// The ledger was empty.
    Nothing,
}

impl fmt::Display for UndoOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed(path) => write!(f, "Undone: removed {}", path.display()),
            Self::Restored(path) => write!(f, "Undone: restored {}", path.display()),
            Self::Nothing => f.write_str("Nothing to undo"),
        }
    }
}

/// FIFO-bounded stack of [`UndoEntry`] values.
#[derive(Debug, Clone)]
pub struct UndoLedger {
    entries: VecDeque<UndoEntry>,
    capacity: usize,
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl UndoLedger {
    /// Create a ledger holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the current state of `path` before it is mutated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn snapshot(&mut self, path: &Path) -> io::Result<()> {
        let prior = match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        self.push(UndoEntry {
            path: path.to_path_buf(),
            prior,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Push an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: UndoEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Pop the newest entry and apply it.
    ///
    /// A failed delete of a file that had not existed is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if prior content cannot be written back.
    pub fn undo_last(&mut self) -> io::Result<UndoOutcome> {
        let Some(entry) = self.entries.pop_back() else {
            return Ok(UndoOutcome::Nothing);
        };

        match entry.prior {
            None => {
                if let Err(e) = std::fs::remove_file(&entry.path) {
                    tracing::debug!(path = %entry.path.display(), error = %e, "undo delete failed");
                }
                Ok(UndoOutcome::Removed(entry.path))
            }
            Some(bytes) => {
                std::fs::write(&entry.path, bytes)?;
                Ok(UndoOutcome::Restored(entry.path))
            }
        }
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is nothing to undo.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored snapshots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }
}
