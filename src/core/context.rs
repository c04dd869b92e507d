//! Working directory context and system prompt generation.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use agent_core::permission::PermissionMode;

use super::memory::MemoryStore;

/// Marker files checked in order; the first present one names the project.
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("package.json", "nodejs"),
    ("go.mod", "go"),
    ("Cargo.toml", "rust"),
    ("requirements.txt", "python"),
    ("pyproject.toml", "python"),
    ("pom.xml", "java"),
    ("composer.json", "php"),
    ("Gemfile", "ruby"),
    ("pubspec.yaml", "flutter"),
    ("CMakeLists.txt", "cpp"),
    ("Makefile", "make"),
    ("docker-compose.yml", "docker"),
    (".git", "git"),
];

/// Directive catalogue shown to the model.
const DIRECTIVE_CATALOGUE: &str = "\
TOOLS (format: <tool>name:arg</tool>):

READ:
- <tool>read:file</tool> - read a file
- <tool>ls:dir</tool> - list a directory
- <tool>tree:dir</tool> - folder structure
- <tool>find:pattern</tool> - find files by name
- <tool>grep:pattern path</tool> - search file contents
- <tool>image:file</tool> - inspect an image

WRITE:
- <tool>write:path|||content</tool> - create or overwrite a file
- <tool>replace:path|||old|||new</tool> - replace exact text
- <tool>append:path|||content</tool> - append to a file

EXECUTE:
- <tool>run:cmd</tool> - shell command
- <tool>git:args</tool> - git command
- <tool>python:code</tool> - run Python
- <tool>node:code</tool> - run JavaScript
- <tool>cd:dir</tool> - change directory

WEB:
- <tool>fetch:url</tool> - fetch a URL
- <tool>search:query</tool> - web search

MEMORY:
- <tool>remember:key:value</tool> - remember a fact

RULES:
1. Use the tools directly instead of telling the user to do it by hand
2. To edit, read first, then replace with the exact text
3. Keep answers short and informative";

/// The single mutable working directory and what lives there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    cwd: PathBuf,
    project_kind: Option<&'static str>,
}

impl WorkspaceContext {
    /// Create a context rooted at `cwd`, detecting the project kind.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        let project_kind = detect_project_kind(&cwd);
        Self { cwd, project_kind }
    }

    /// Current directory.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Detected project kind, if any marker file was found.
    #[must_use]
    pub const fn project_kind(&self) -> Option<&'static str> {
        self.project_kind
    }

    /// Move to `dir` and re-detect the project kind.
    pub fn change_dir(&mut self, dir: PathBuf) {
        self.project_kind = detect_project_kind(&dir);
        tracing::debug!(dir = %dir.display(), project = ?self.project_kind, "changed directory");
        self.cwd = dir;
    }
}

/// Detect the project kind from marker files in `dir`.
#[must_use]
pub fn detect_project_kind(dir: &Path) -> Option<&'static str> {
    PROJECT_MARKERS
        .iter()
        .find(|(marker, _)| dir.join(marker).exists())
        .map(|(_, kind)| *kind)
}

/// Get the current git branch.
#[must_use]
pub fn git_branch(dir: &Path) -> Option<String> {
    Command::new("git")
        .args(["branch", "--show-current"])
        .current_dir(dir)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn hostname() -> String {
    Command::new("hostname")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the system prompt from the current context, mode, and memory.
#[must_use]
pub fn system_prompt(ctx: &WorkspaceContext, mode: PermissionMode, memory: &MemoryStore) -> String {
    let mut prompt = format!(
        "You are termpilot v{}, an AI terminal assistant with full access to the local system.\n\n",
        env!("CARGO_PKG_VERSION")
    );

    let user = std::env::var("USER").unwrap_or_default();
    let _ = writeln!(prompt, "SYSTEM:");
    let _ = writeln!(
        prompt,
        "- Host: {} | OS: {}/{} | User: {user}",
        hostname(),
        std::env::consts::OS,
        std::env::consts::ARCH,
    );
    let _ = writeln!(
        prompt,
        "- Dir: {} | Project: {} | Mode: {mode}",
        ctx.cwd().display(),
        ctx.project_kind().unwrap_or("unknown"),
    );

    if !memory.is_empty() {
        let _ = write!(prompt, "\nMEMORY:\n{}\n", memory.to_prompt_lines());
    }

    prompt.push('\n');
    prompt.push_str(DIRECTIVE_CATALOGUE);
    prompt
}
