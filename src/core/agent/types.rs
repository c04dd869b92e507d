//! Agent types.
//!
//! Re-exports from agent-core, plus events for terminal rendering.

use std::path::PathBuf;

pub use agent_core::types::{Message, Role, Usage};

/// Events emitted during a chat turn for UI rendering
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A mentioned file was attached to the user message
    Attached(PathBuf),
    /// First streamed token of a completion is about to be delivered
    FirstToken,
    /// Text chunk from the assistant
    Text(String),
    /// Directive batch is about to run
    ToolsStart { count: usize },
    /// One directive finished
    ToolResult { name: String, output: String },
    /// Directive batch finished; the summary request follows
    ToolsDone,
    /// Latest token count and running cost
    Usage { total_tokens: u32, cost_usd: f64 },
}
