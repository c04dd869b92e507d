//! Agent primitives for termpilot: the directive protocol, the approval
//! gate, the undo ledger, and a streaming completion client.

pub mod conversation;
pub mod directive;
pub mod error;
pub mod path;
pub mod permission;
pub mod provider;
pub mod providers;
pub mod types;
pub mod undo;
