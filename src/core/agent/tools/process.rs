//! Shell commands, git, and script interpreters.

use std::io::Write as _;
use std::path::Path;
use std::process::{Output, Stdio};

use tokio::process::Command;

use super::ToolContext;

pub(super) async fn run(ctx: &ToolContext, command: &str) -> String {
    tracing::info!(command = %command, "executing shell command");
    shell(ctx.workspace.cwd(), command).await
}

pub(super) async fn git(ctx: &ToolContext, args: &str) -> String {
    shell(ctx.workspace.cwd(), &format!("git {args}")).await
}

/// Write `code` to a temp file and run it with `interpreter`.
pub(super) async fn script(ctx: &ToolContext, interpreter: &str, suffix: &str, code: &str) -> String {
    let file = match tempfile::Builder::new()
        .prefix("termpilot_")
        .suffix(suffix)
        .tempfile()
    {
        Ok(file) => file,
        Err(e) => return format!("Error: {e}"),
    };
    if let Err(e) = file.as_file().write_all(code.as_bytes()) {
        return format!("Error: {e}");
    }

    let output = Command::new(interpreter)
        .arg(file.path())
        .current_dir(ctx.workspace.cwd())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    // temp file is removed when `file` drops
    render(output)
}

async fn shell(cwd: &Path, command: &str) -> String {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    render(output)
}

/// Stdout, then stderr, then the exit code when it isn't zero.
fn render(output: std::io::Result<Output>) -> String {
    let output = match output {
        Ok(output) => output,
        Err(e) => return format!("Error: {e}"),
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        match output.status.code() {
            Some(code) => text.push_str(&format!("\nExit: {code}")),
            None => text.push_str("\nExit: signal"),
        }
    }

    if text.trim().is_empty() {
        return "(no output)".to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use agent_core::permission::PermissionMode;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> ToolContext {
        ToolContext::new(
            dir.path().to_path_buf(),
            PermissionMode::Unrestricted,
            Limits::default(),
        )
    }

    #[tokio::test]
    async fn run_uses_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("here.txt"), "").unwrap();

        let out = run(&context(&dir), "ls").await;
        assert!(out.contains("here.txt"));
    }

    #[tokio::test]
    async fn run_reports_stderr_and_exit_code() {
        let dir = TempDir::new().unwrap();

        let out = run(&context(&dir), "echo out; echo err >&2; exit 3").await;
        assert_eq!(out, "out\nerr\n\nExit: 3");
    }

    #[tokio::test]
    async fn silent_success_is_marked() {
        let dir = TempDir::new().unwrap();
        assert_eq!(run(&context(&dir), "true").await, "(no output)");
    }

    #[tokio::test]
    async fn git_outside_repo_reports_failure() {
        let dir = TempDir::new().unwrap();
        let out = git(&context(&dir), "rev-parse --is-inside-work-tree").await;
        assert!(out.contains("Exit:"));
    }

    #[tokio::test]
    async fn script_runs_through_interpreter() {
        let dir = TempDir::new().unwrap();
        let out = script(&context(&dir), "sh", ".sh", "echo from-script; pwd").await;
        assert!(out.starts_with("from-script\n"));
        assert!(out.contains(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn missing_interpreter_is_error_text() {
        let dir = TempDir::new().unwrap();
        let out = script(&context(&dir), "definitely-not-an-interpreter", ".x", "1").await;
        assert!(out.starts_with("Error:"));
    }
}
