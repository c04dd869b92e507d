//! `@path` mentions in user input.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
}

/// Extract `@path` mentions from text.
///
/// A mention starts with `@` at the start of the text or after whitespace,
/// so email addresses are ignored. Trailing dots are dropped so a mention
/// can end a sentence.
#[must_use]
pub fn parse_at_mentions(text: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let at_start_or_after_whitespace = i == 0 || chars[i - 1].is_whitespace();
        if chars[i] == '@' && at_start_or_after_whitespace {
            let start = i + 1;
            let mut end = start;

            while end < len && is_path_char(chars[end]) {
                end += 1;
            }

            let path: String = chars[start..end].iter().collect();
            let path = path.trim_end_matches('.');
            if !path.is_empty() {
                paths.push(path.to_string());
            }

            i = end.max(start);
        } else {
            i += 1;
        }
    }

    paths
}

/// Text with every readable mention appended, plus the files that were attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expanded {
    pub text: String,
    pub attached: Vec<PathBuf>,
}

/// Append the first `max_lines` lines of each mentioned file as
/// `=== /abs/path ===` blocks. Unreadable files are skipped.
#[must_use]
pub fn expand_mentions(text: &str, cwd: &Path, max_lines: usize) -> Expanded {
    let mut blocks = Vec::new();
    let mut attached = Vec::new();

    for mention in parse_at_mentions(text) {
        let full = agent_core::path::resolve(&mention, cwd);
        let Ok(content) = std::fs::read_to_string(&full) else {
            tracing::debug!(path = %full.display(), "skipping unreadable mention");
            continue;
        };

        let lines: Vec<&str> = content.split('\n').collect();
        let mut body = lines
            .iter()
            .take(max_lines)
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        if lines.len() > max_lines {
            let _ = write!(body, "\n... +{} lines", lines.len() - max_lines);
        }

        blocks.push(format!("=== {} ===\n{body}", full.display()));
        attached.push(full);
    }

    if blocks.is_empty() {
        return Expanded {
            text: text.to_string(),
            attached,
        };
    }

    Expanded {
        text: format!("{text}\n\n{}", blocks.join("\n\n")),
        attached,
    }
}
