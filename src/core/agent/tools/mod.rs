//! Local operations driven by model directives.
//!
//! Every directive is parsed into an [`Operation`] at the registry boundary,
//! checked against the [`PermissionGate`], and run. Handlers never fail: errors
//! are folded into the returned text so one bad directive can't abort a batch.

mod fs;
mod process;
mod web;

use std::path::PathBuf;

use agent_core::directive::{Directive, split_fields};
use agent_core::permission::{Authorization, OperationKind, PermissionGate, PermissionMode};
use agent_core::undo::UndoLedger;

use crate::config::Limits;
use crate::core::context::WorkspaceContext;
use crate::core::memory::{MemoryManager, MemoryStore};

/// Interactive yes/no used by the ConfirmEach mode.
pub trait Confirm: Send + Sync {
    /// Ask the user; anything but an explicit yes is `false`.
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Mutable state shared by all operations in a session.
#[derive(Debug)]
pub struct ToolContext {
    /// Current directory and project kind.
    pub workspace: WorkspaceContext,
    /// Approval mode.
    pub gate: PermissionGate,
    /// Pre-mutation snapshots.
    pub undo: UndoLedger,
    /// Remembered facts.
    pub memory: MemoryStore,
    /// Output caps.
    pub limits: Limits,
    memory_manager: Option<MemoryManager>,
}

impl ToolContext {
    /// Create a context rooted at `cwd`.
    #[must_use]
    pub fn new(cwd: PathBuf, mode: PermissionMode, limits: Limits) -> Self {
        Self {
            workspace: WorkspaceContext::new(cwd),
            gate: PermissionGate::new(mode),
            undo: UndoLedger::with_capacity(limits.undo_capacity),
            memory: MemoryStore::default(),
            limits,
            memory_manager: None,
        }
    }

    /// Attach loaded memory and the manager that persists it.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryStore, manager: Option<MemoryManager>) -> Self {
        self.memory = memory;
        self.memory_manager = manager;
        self
    }

    /// Resolve a user-supplied path against the current directory.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> PathBuf {
        agent_core::path::resolve(raw, self.workspace.cwd())
    }

    /// Remember a fact and persist the store.
    pub fn remember(&mut self, key: &str, value: &str) {
        self.memory.remember(key, value);
        self.persist_memory();
    }

    /// Forget a fact and persist the store. Returns whether it existed.
    pub fn forget(&mut self, key: &str) -> bool {
        let existed = self.memory.forget(key).is_some();
        if existed {
            self.persist_memory();
        }
        existed
    }

    /// Write memory through to storage. Failures are logged, not raised.
    pub fn persist_memory(&self) {
        if let Some(manager) = &self.memory_manager {
            if let Err(e) = manager.save(&self.memory) {
                tracing::warn!(error = %e, "failed to save memory");
            }
        }
    }
}

/// A directive parsed into its operation and typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Read { path: String },
    List { path: String },
    Tree { path: String },
    Find { pattern: String },
    Grep { pattern: String, path: Option<String> },
    Write { path: String, content: String },
    Replace { path: String, old: String, new: String },
    Append { path: String, content: String },
    Run { command: String },
    ChangeDir { path: String },
    Git { args: String },
    Fetch { url: String },
    Python { code: String },
    Node { code: String },
    Image { path: String },
    Search { query: String },
    Remember { key: String, value: String },
}

impl Operation {
    /// Parse a directive. `Err` carries the result text to report instead.
    pub fn parse(directive: &Directive) -> Result<Self, String> {
        let arg = directive.argument.as_str();
        let required = |usage: &str| {
            if arg.is_empty() {
                Err(format!("Usage: {usage}"))
            } else {
                Ok(arg.to_string())
            }
        };

        let op = match directive.name.as_str() {
            "read" => Self::Read {
                path: required("read <file>")?,
            },
            "ls" | "list" => Self::List {
                path: arg.to_string(),
            },
            "tree" => Self::Tree {
                path: arg.to_string(),
            },
            "find" => Self::Find {
                pattern: required("find <pattern>")?,
            },
            "grep" => {
                let rest = required("grep <pattern> [path]")?;
                match rest.split_once(' ') {
                    Some((pattern, path)) if !path.trim().is_empty() => Self::Grep {
                        pattern: pattern.to_string(),
                        path: Some(path.trim().to_string()),
                    },
                    _ => Self::Grep {
                        pattern: rest.trim().to_string(),
                        path: None,
                    },
                }
            }
            "write" => {
                let [path, content] = two_fields(arg, "Error: format path|||content")?;
                Self::Write { path, content }
            }
            "append" => {
                let [path, content] = two_fields(arg, "Error: format path|||content")?;
                Self::Append { path, content }
            }
            "replace" => {
                let fields = split_fields(arg, 3)
                    .ok_or_else(|| "Error: format path|||old|||new".to_string())?;
                Self::Replace {
                    path: fields[0].trim().to_string(),
                    old: fields[1].to_string(),
                    new: fields[2].to_string(),
                }
            }
            "run" => Self::Run {
                command: required("run <command>")?,
            },
            "cd" => Self::ChangeDir {
                path: arg.to_string(),
            },
            "git" => Self::Git {
                args: if arg.is_empty() { "status" } else { arg }.to_string(),
            },
            "fetch" => Self::Fetch {
                url: required("fetch <url>")?,
            },
            "python" => Self::Python {
                code: required("python <code>")?,
            },
            "node" => Self::Node {
                code: required("node <code>")?,
            },
            "image" | "img" => Self::Image {
                path: required("image <file>")?,
            },
            "search" => Self::Search {
                query: required("search <query>")?,
            },
            "remember" => {
                let (key, value) = arg
                    .split_once(':')
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| "Error: format key:value".to_string())?;
                Self::Remember {
                    key: key.to_string(),
                    value: value.to_string(),
                }
            }
            other => return Err(format!("Unknown tool: {other}")),
        };

        Ok(op)
    }

    /// Wire name, used to label results.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::List { .. } => "ls",
            Self::Tree { .. } => "tree",
            Self::Find { .. } => "find",
            Self::Grep { .. } => "grep",
            Self::Write { .. } => "write",
            Self::Replace { .. } => "replace",
            Self::Append { .. } => "append",
            Self::Run { .. } => "run",
            Self::ChangeDir { .. } => "cd",
            Self::Git { .. } => "git",
            Self::Fetch { .. } => "fetch",
            Self::Python { .. } => "python",
            Self::Node { .. } => "node",
            Self::Image { .. } => "image",
            Self::Search { .. } => "search",
            Self::Remember { .. } => "remember",
        }
    }

    /// Gate classification. Anything that writes files or spawns a process
    /// is mutating; `git` is always gated.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Write { .. }
            | Self::Replace { .. }
            | Self::Append { .. }
            | Self::Run { .. }
            | Self::Git { .. }
            | Self::Python { .. }
            | Self::Node { .. } => OperationKind::Mutating,
            _ => OperationKind::ReadOnly,
        }
    }

    /// One-line description shown in confirmation prompts and denials.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Read { path } => format!("Read {path}"),
            Self::List { path } | Self::Tree { path } => format!("List {path}"),
            Self::Find { pattern } => format!("Find {pattern}"),
            Self::Grep { pattern, .. } => format!("Grep {pattern}"),
            Self::Write { path, content } => format!("Write {path} ({} bytes)", content.len()),
            Self::Replace { path, .. } => format!("Replace in {path}"),
            Self::Append { path, .. } => format!("Append to {path}"),
            Self::Run { command } => format!("Run: {command}"),
            Self::ChangeDir { path } => format!("cd {path}"),
            Self::Git { args } => format!("git {args}"),
            Self::Fetch { url } => format!("Fetch {url}"),
            Self::Python { .. } => "Run python script".to_string(),
            Self::Node { .. } => "Run node script".to_string(),
            Self::Image { path } => format!("Inspect image {path}"),
            Self::Search { query } => format!("Search {query}"),
            Self::Remember { key, .. } => format!("Remember {key}"),
        }
    }
}

fn two_fields(arg: &str, usage: &str) -> Result<[String; 2], String> {
    let fields = split_fields(arg, 2).ok_or_else(|| usage.to_string())?;
    Ok([fields[0].trim().to_string(), fields[1].to_string()])
}

/// Result text for a denied or declined operation.
#[must_use]
pub fn blocked(description: &str) -> String {
    format!("[blocked] {description}")
}

/// Dispatches operations to their handlers.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    http: reqwest::Client,
}

impl ToolRegistry {
    /// Create a new tool registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and run one directive, returning its result text.
    pub async fn execute(
        &self,
        directive: &Directive,
        ctx: &mut ToolContext,
        confirm: &dyn Confirm,
    ) -> String {
        match Operation::parse(directive) {
            Ok(op) => self.run(op, ctx, confirm).await,
            Err(message) => {
                tracing::debug!(name = %directive.name, message = %message, "rejected directive");
                message
            }
        }
    }

    /// Gate and run an operation.
    pub async fn run(&self, op: Operation, ctx: &mut ToolContext, confirm: &dyn Confirm) -> String {
        let description = op.describe();
        let needs_confirm = match ctx.gate.authorize(op.kind(), description.as_str()) {
            Authorization::Proceed => false,
            Authorization::Prompt(_) => true,
            Authorization::Deny => {
                tracing::info!(op = op.name(), mode = %ctx.gate.mode(), "operation blocked");
                return blocked(&description);
            }
        };

        // replace confirms after its preview is known
        if needs_confirm && !matches!(op, Operation::Replace { .. }) && !confirm.confirm(&description)
        {
            return blocked(&description);
        }

        tracing::info!(op = op.name(), "executing operation");

        match op {
            Operation::Read { path } => fs::read(ctx, &path),
            Operation::List { path } => fs::list(ctx, &path),
            Operation::Tree { path } => fs::tree(ctx, &path),
            Operation::Find { pattern } => fs::find(ctx, &pattern),
            Operation::Grep { pattern, path } => fs::grep(ctx, &pattern, path.as_deref()),
            Operation::Write { path, content } => fs::write(ctx, &path, &content),
            Operation::Replace { path, old, new } => {
                let confirm = needs_confirm.then_some(confirm);
                fs::replace(ctx, &path, &old, &new, confirm)
            }
            Operation::Append { path, content } => fs::append(ctx, &path, &content),
            Operation::Image { path } => fs::image(ctx, &path),
            Operation::ChangeDir { path } => fs::change_dir(ctx, &path),
            Operation::Run { command } => process::run(ctx, &command).await,
            Operation::Git { args } => process::git(ctx, &args).await,
            Operation::Python { code } => process::script(ctx, "python3", ".py", &code).await,
            Operation::Node { code } => process::script(ctx, "node", ".js", &code).await,
            Operation::Fetch { url } => web::fetch(&self.http, &ctx.limits, &url).await,
            Operation::Search { query } => web::search(&self.http, &ctx.limits, &query).await,
            Operation::Remember { key, value } => {
                ctx.remember(&key, &value);
                format!("Remembered: {key}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dir: &TempDir, mode: PermissionMode) -> ToolContext {
        ToolContext::new(dir.path().to_path_buf(), mode, Limits::default())
    }

    fn directive(name: &str, argument: &str) -> Directive {
        Directive::new(name, argument)
    }

    fn never(_: &str) -> bool {
        panic!("confirmation should not be requested")
    }

    #[test]
    fn parse_splits_multi_field_arguments() {
        assert_eq!(
            Operation::parse(&directive("write", "a.txt|||x|||y")),
            Ok(Operation::Write {
                path: "a.txt".to_string(),
                content: "x|||y".to_string(),
            })
        );
        assert_eq!(
            Operation::parse(&directive("replace", " a.txt |||old|||new")),
            Ok(Operation::Replace {
                path: "a.txt".to_string(),
                old: "old".to_string(),
                new: "new".to_string(),
            })
        );
        assert_eq!(
            Operation::parse(&directive("grep", "fn main src")),
            Ok(Operation::Grep {
                pattern: "fn".to_string(),
                path: Some("main src".to_string()),
            })
        );
        assert_eq!(
            Operation::parse(&directive("remember", "lang: rust")),
            Ok(Operation::Remember {
                key: "lang".to_string(),
                value: "rust".to_string(),
            })
        );
    }

    #[test]
    fn parse_reports_format_errors() {
        assert_eq!(
            Operation::parse(&directive("write", "no-separator")),
            Err("Error: format path|||content".to_string())
        );
        assert_eq!(
            Operation::parse(&directive("replace", "a|||b")),
            Err("Error: format path|||old|||new".to_string())
        );
        assert_eq!(
            Operation::parse(&directive("frobnicate", "x")),
            Err("Unknown tool: frobnicate".to_string())
        );
        assert_eq!(
            Operation::parse(&directive("read", "")),
            Err("Usage: read <file>".to_string())
        );
    }

    #[test]
    fn git_defaults_to_status_and_is_gated() {
        let op = Operation::parse(&directive("git", "")).unwrap();
        assert_eq!(op, Operation::Git {
            args: "status".to_string()
        });
        assert_eq!(op.kind(), OperationKind::Mutating);
    }

    #[test]
    fn list_alias_parses_as_ls() {
        let op = Operation::parse(&directive("list", "src")).unwrap();
        assert_eq!(op.name(), "ls");
        assert_eq!(op.kind(), OperationKind::ReadOnly);
    }

    #[tokio::test]
    async fn blocked_mode_refuses_run_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, PermissionMode::Blocked);
        let registry = ToolRegistry::new();

        let result = registry
            .execute(&directive("run", "touch marker"), &mut ctx, &never)
            .await;

        assert_eq!(result, "[blocked] Run: touch marker");
        assert!(!dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn blocked_mode_still_allows_reads() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let mut ctx = context(&dir, PermissionMode::Blocked);

        let result = ToolRegistry::new()
            .execute(&directive("read", "a.txt"), &mut ctx, &never)
            .await;

        assert!(result.contains("   1│ hello"));
    }

    #[tokio::test]
    async fn confirm_each_declined_is_blocked() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, PermissionMode::ConfirmEach);

        let result = ToolRegistry::new()
            .execute(&directive("write", "new.txt|||data"), &mut ctx, &|_: &str| false)
            .await;

        assert!(result.starts_with("[blocked]"));
        assert!(!dir.path().join("new.txt").exists());
        assert!(ctx.undo.is_empty());
    }

    #[tokio::test]
    async fn confirm_each_accepted_runs() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, PermissionMode::ConfirmEach);

        let result = ToolRegistry::new()
            .execute(&directive("write", "new.txt|||data"), &mut ctx, &|_: &str| true)
            .await;

        assert!(result.starts_with("✓ Written:"));
        assert_eq!(std::fs::read_to_string(dir.path().join("new.txt")).unwrap(), "data");
    }

    #[tokio::test]
    async fn confirm_each_replace_prompt_includes_preview() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "let x = 1;\n").unwrap();
        let mut ctx = context(&dir, PermissionMode::ConfirmEach);

        let seen = std::sync::Mutex::new(String::new());
        let capture = |prompt: &str| {
            *seen.lock().unwrap() = prompt.to_string();
            false
        };

        let result = ToolRegistry::new()
            .execute(&directive("replace", "a.txt|||1|||2"), &mut ctx, &capture)
            .await;

        assert!(result.starts_with("[blocked]"));
        let prompt = seen.lock().unwrap().clone();
        assert!(prompt.contains("-1"));
        assert!(prompt.contains("+2"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "let x = 1;\n"
        );
    }

    #[tokio::test]
    async fn read_only_ops_never_prompt() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, PermissionMode::ConfirmEach);

        let result = ToolRegistry::new()
            .execute(&directive("ls", ""), &mut ctx, &never)
            .await;

        assert!(result.ends_with("0 dirs, 0 files"));
    }

    #[tokio::test]
    async fn unknown_tool_is_labeled() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, PermissionMode::Unrestricted);

        let result = ToolRegistry::new()
            .execute(&directive("teleport", "mars"), &mut ctx, &never)
            .await;

        assert_eq!(result, "Unknown tool: teleport");
    }

    #[tokio::test]
    async fn remember_updates_memory() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, PermissionMode::Blocked);

        let result = ToolRegistry::new()
            .execute(&directive("remember", "editor:helix"), &mut ctx, &never)
            .await;

        assert_eq!(result, "Remembered: editor");
        assert_eq!(ctx.memory.get("editor"), Some("helix"));
    }

    #[test]
    fn remember_persists_through_manager() {
        let dir = TempDir::new().unwrap();
        let (storage, _store_dir) = crate::core::storage::temp_storage();
        let manager = MemoryManager::new(storage);
        let mut ctx = context(&dir, PermissionMode::Unrestricted)
            .with_memory(MemoryStore::default(), Some(manager.clone()));

        ctx.remember("k", "v");
        assert_eq!(manager.load().unwrap().get("k"), Some("v"));

        assert!(ctx.forget("k"));
        assert!(manager.load().unwrap().is_empty());
        assert!(!ctx.forget("k"));
    }
}
