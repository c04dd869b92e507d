//! termpilot - an AI assistant that works in your terminal.
//!
//! The model embeds `<tool>name:argument</tool>` directives in its replies;
//! termpilot runs them locally behind a three-state approval gate, feeds the
//! results back, and asks for a short summary.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   CLI (clap, REPL)       │
//! └────────────┬─────────────┘
//!              │
//! ┌────────────┴─────────────┐
//! │ Core (agent, tools,      │
//! │ context, sessions)       │
//! └────────────┬─────────────┘
//!              │
//! ┌────────────┴─────────────┐
//! │ agent-core (directives,  │
//! │ gate, undo, provider)    │
//! └──────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
pub use core::agent::Agent;
