//! Markdown transcript export.

use std::fmt::Write;

use agent_core::types::Role;
use chrono::{DateTime, Utc};

use super::Session;

/// Default transcript file name: `chat_<id>_<YYYYmmdd_HHMMSS>.md`.
#[must_use]
pub fn default_export_name(session_id: &str, at: DateTime<Utc>) -> String {
    format!("chat_{session_id}_{}.md", at.format("%Y%m%d_%H%M%S"))
}

/// Format a session as a Markdown transcript. The system turn is left out.
#[must_use]
pub fn format_as_markdown(session: &Session) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Session {}\n", session.id);
    let _ = writeln!(md, "**Created:** {}", format_timestamp(session.created));
    let _ = writeln!(md, "**Directory:** {}", session.working_directory.display());
    let _ = writeln!(md, "**Mode:** {}\n", session.mode);
    md.push_str("---\n");

    for message in session.history.messages() {
        let role = match message.role {
            Role::System => continue,
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        let _ = write!(md, "\n## {role}\n{}\n", message.content);
    }

    md
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
