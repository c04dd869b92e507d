//! Core logic shared by the REPL and single-message mode.

pub mod agent;
pub mod context;
mod error;
pub mod memory;
pub mod session;
pub mod storage;

use std::path::PathBuf;

use agent_core::provider::LlmProvider;

pub use agent::Agent;
pub use context::WorkspaceContext;
pub use error::{Error, Result};

use crate::config::Config;
use agent::ToolContext;
use memory::MemoryManager;
use session::SessionManager;
use storage::Storage;

/// Persistent stores under one data directory.
#[derive(Debug, Clone)]
pub struct Stores {
    pub memory: MemoryManager,
    pub sessions: SessionManager,
}

impl Stores {
    /// Open the stores under the default data directory.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be determined.
    pub fn open() -> Result<Self> {
        let storage = Storage::new().map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self::from_storage(storage))
    }

    /// Open the stores under `root`.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self::from_storage(Storage::with_root(root))
    }

    fn from_storage(storage: Storage) -> Self {
        Self {
            memory: MemoryManager::new(storage.clone()),
            sessions: SessionManager::new(storage),
        }
    }
}

/// Build an agent rooted at `cwd` with persisted memory loaded.
///
/// # Errors
///
/// Returns error if the memory file exists but cannot be read.
pub fn build_agent(
    config: &Config,
    provider: Box<dyn LlmProvider>,
    cwd: PathBuf,
    stores: &Stores,
) -> Result<Agent> {
    let memory = stores.memory.load()?;
    tracing::debug!(facts = memory.len(), "loaded memory");

    let ctx = ToolContext::new(cwd, config.ui.default_mode, config.limits.clone())
        .with_memory(memory, Some(stores.memory.clone()));

    Ok(Agent::new(provider, config.agent.clone(), ctx))
}
