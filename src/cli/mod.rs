//! CLI command parsing and execution.

pub mod auth;
pub mod commands;
pub mod repl;
pub mod thinking;

use agent_core::permission::PermissionMode;
use clap::{Parser, Subcommand};

/// termpilot - an AI assistant that works in your terminal.
#[derive(Parser)]
#[command(name = "termpilot")]
#[command(about = "AI terminal assistant that reads, edits and runs things for you")]
#[command(version)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Message to send once instead of starting the interactive loop.
    pub message: Vec<String>,

    /// Approval mode for mutating operations (unrestricted, confirm-each, blocked).
    #[arg(short, long)]
    pub mode: Option<PermissionMode>,

    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Positional words joined into one message, if any were given.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let message = self.message.join(" ");
        (!message.trim().is_empty()).then_some(message)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print version information.
    Version,

    /// Resume the most recent session for this directory, or one by ID.
    Resume {
        /// Session ID to resume.
        session_id: Option<String>,
    },

    /// List saved sessions.
    Sessions {
        /// Limit number of sessions shown.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export a session as a Markdown transcript.
    Export {
        /// Session ID (defaults to the most recent one).
        session_id: Option<String>,

        /// Output file path (defaults to chat_<id>_<timestamp>.md).
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Manage remembered facts.
    Memory {
        #[command(subcommand)]
        command: Option<MemoryCommands>,
    },

    /// Store the API key.
    Login {
        /// Key to store; prompted for when omitted.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// List remembered facts.
    List,

    /// Remember a fact.
    Set {
        key: String,
        value: String,
    },

    /// Forget a fact.
    Forget {
        key: String,
    },

    /// Forget everything.
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration.
    Show,

    /// Show the configuration file path.
    Path,
}
