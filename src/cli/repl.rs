//! Interactive loop.

use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};

use agent_core::permission::PermissionMode;
use chrono::Utc;
use crossterm::style::Stylize;
use dialoguer::{Confirm as ConfirmPrompt, theme::ColorfulTheme};

use super::commands::{HELP, SlashCommand};
use super::thinking::Thinking;
use crate::config::Config;
use crate::core::agent::{Agent, ChatEvent, Confirm, Operation};
use crate::core::context::git_branch;
use crate::core::session::{Session, default_export_name, format_as_markdown};
use crate::core::Stores;

/// Asks on the terminal before a mutating operation runs.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        println!("\n{}", prompt.yellow());
        ConfirmPrompt::with_theme(&ColorfulTheme::default())
            .with_prompt("Proceed?")
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// How the interactive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// `exit`, `quit`, or end of input.
    Quit,
    /// Ctrl-C.
    Interrupted,
}

/// Interactive chat session state.
pub struct Repl {
    agent: Agent,
    stores: Stores,
    session: Session,
    show_thinking: bool,
}

impl Repl {
    /// Create a REPL, resuming `resumed` when given.
    #[must_use]
    pub fn new(mut agent: Agent, stores: Stores, config: &Config, resumed: Option<Session>) -> Self {
        let session = match resumed {
            Some(session) => {
                agent.restore(&session);
                session
            }
            None => Session::new(agent.context().workspace.cwd().to_path_buf()),
        };

        Self {
            agent,
            stores,
            session,
            show_thinking: config.ui.show_thinking,
        }
    }

    /// Run until `exit`, `quit`, end of input, or Ctrl-C.
    ///
    /// Memory and a non-empty session are saved either way. A turn cut short
    /// by Ctrl-C is dropped from history before saving.
    pub async fn run(&mut self) -> anyhow::Result<Exit> {
        self.print_banner();

        loop {
            println!("{}", self.status_line().dark_grey());
            let read = tokio::task::spawn_blocking(|| read_input(&mut std::io::stdin().lock().lines()));
            let input = tokio::select! {
                read = read => read??,
                _ = tokio::signal::ctrl_c() => return Ok(self.interrupted()),
            };
            let Some(input) = input else {
                break;
            };
            let input = input.trim();

            match input {
                "" => continue,
                "exit" | "quit" => break,
                _ => {}
            }

            let checkpoint = self.agent.conversation().len();
            let interrupted = tokio::select! {
                () = self.dispatch(input) => false,
                _ = tokio::signal::ctrl_c() => true,
            };
            if interrupted {
                self.agent.rewind(checkpoint);
                return Ok(self.interrupted());
            }
            println!();
        }

        self.finish();
        Ok(Exit::Quit)
    }

    /// Save state after Ctrl-C and report how the loop ended.
    pub fn interrupted(&mut self) -> Exit {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::cursor::MoveToColumn(0),
            crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine)
        );
        println!();
        self.finish();
        Exit::Interrupted
    }

    fn finish(&mut self) {
        self.agent.context().persist_memory();
        if !self.agent.conversation().is_empty() {
            match self.save() {
                Ok(()) => println!("{}", format!("Saved session {}", self.session.id).dark_grey()),
                Err(e) => tracing::warn!(error = %e, "failed to save session on exit"),
            }
        }
        println!("Bye!");
    }

    async fn dispatch(&mut self, input: &str) {
        if input.starts_with('/') {
            self.handle_command(SlashCommand::parse(input)).await;
        } else {
            self.chat(input).await;
        }
    }

    /// Send one message and render the turn.
    pub async fn chat(&mut self, input: &str) {
        let mut thinking = self.show_thinking.then(|| Thinking::start("Thinking..."));
        let mut stdout = std::io::stdout();

        let result = self
            .agent
            .chat(
                input,
                |event| render_event(event, &mut thinking, &mut stdout),
                &TerminalConfirm,
            )
            .await;
        drop(thinking);

        match result {
            Ok(_) => println!(),
            Err(e) => eprintln!("\n{}", format!("Error: {e}").red()),
        }
    }

    async fn handle_command(&mut self, command: SlashCommand) {
        match command {
            SlashCommand::Mode(None) => {
                let mode = self.agent.cycle_mode();
                println!("Mode: {}", describe_mode(mode));
            }
            SlashCommand::Mode(Some(mode)) => {
                self.agent.set_mode(mode);
                println!("Mode: {}", describe_mode(mode));
            }
            SlashCommand::Undo => println!("{}", self.agent.undo()),
            SlashCommand::Edit(path) => self.edit(path).await,
            SlashCommand::Save => match self.save() {
                Ok(()) => println!("Saved session {}", self.session.id),
                Err(e) => println!("{}", format!("Error: {e}").red()),
            },
            SlashCommand::Export(file) => match self.export(file.as_deref()) {
                Ok(path) => println!("Exported to {}", path.display()),
                Err(e) => println!("{}", format!("Error: {e}").red()),
            },
            SlashCommand::Copy => match self.agent.last_response() {
                Some(text) => match copy_to_clipboard(text) {
                    Ok(()) => println!("Copied last response"),
                    Err(e) => println!("{}", format!("Error: {e}").red()),
                },
                None => println!("Nothing to copy"),
            },
            SlashCommand::Memory => {
                let memory = &self.agent.context().memory;
                if memory.is_empty() {
                    println!("No memories");
                } else {
                    println!("{}", memory.to_prompt_lines());
                }
            }
            SlashCommand::Remember { key, value } => {
                self.agent.remember(&key, &value);
                println!("Remembered: {key}");
            }
            SlashCommand::Forget(key) => {
                if self.agent.forget(&key) {
                    println!("Forgot: {key}");
                } else {
                    println!("Not found: {key}");
                }
            }
            SlashCommand::Sessions => match self.stores.sessions.list() {
                Ok(sessions) => print!("{}", format_session_list(&sessions, 10)),
                Err(e) => println!("{}", format!("Error: {e}").red()),
            },
            SlashCommand::Clear => {
                self.agent.clear();
                println!("Conversation cleared");
            }
            SlashCommand::Context => {
                let ctx = &self.agent.context().workspace;
                println!("Dir:     {}", ctx.cwd().display());
                println!("Project: {}", ctx.project_kind().unwrap_or("unknown"));
                println!(
                    "Branch:  {}",
                    git_branch(ctx.cwd()).unwrap_or_else(|| "-".to_string())
                );
                println!("Mode:    {}", self.agent.mode());
                println!("Turns:   {}", self.agent.conversation().len().saturating_sub(1));
            }
            SlashCommand::Cost => {
                println!(
                    "Tokens: {}/{}  Cost: ${:.4}",
                    self.agent.token_count(),
                    self.agent.config().max_context_tokens,
                    self.agent.cost()
                );
            }
            SlashCommand::Pwd => println!("{}", self.agent.context().workspace.cwd().display()),
            SlashCommand::Help => println!("{HELP}"),
            SlashCommand::Tool(op) => {
                let output = self.agent.run_operation(op, &TerminalConfirm).await;
                println!("{output}");
            }
            SlashCommand::Invalid(message) => println!("{message}"),
        }
    }

    /// Collect new contents at the prompt and write them through the gate.
    async fn edit(&mut self, path: String) {
        let full = self.agent.context().resolve(&path);
        println!("{}", edit_preview(&full).dark_grey());
        println!("\n{}", "Enter content (/save or /cancel):".yellow());

        let body = tokio::task::spawn_blocking(|| read_edit_body(&mut std::io::stdin().lock().lines())).await;
        match body {
            Ok(Ok(Some(content))) => {
                let output = self
                    .agent
                    .run_operation(Operation::Write { path, content }, &TerminalConfirm)
                    .await;
                println!("{output}");
            }
            Ok(Ok(None)) => println!("Cancelled"),
            Ok(Err(e)) => println!("{}", format!("Error: {e}").red()),
            Err(e) => println!("{}", format!("Error: {e}").red()),
        }
    }

    fn save(&mut self) -> anyhow::Result<()> {
        self.agent.save_into(&mut self.session);
        self.stores.sessions.save(&mut self.session)?;
        Ok(())
    }

    fn export(&mut self, file: Option<&str>) -> anyhow::Result<PathBuf> {
        self.agent.save_into(&mut self.session);
        let cwd = self.agent.context().workspace.cwd();
        let path = match file {
            Some(file) => agent_core::path::resolve(file, cwd),
            None => cwd.join(default_export_name(&self.session.id, Utc::now())),
        };
        std::fs::write(&path, format_as_markdown(&self.session))?;
        Ok(path)
    }

    fn status_line(&self) -> String {
        let ctx = &self.agent.context().workspace;
        format_status(&Status {
            mode: self.agent.mode(),
            tokens: self.agent.token_count(),
            max_tokens: self.agent.config().max_context_tokens,
            cost: self.agent.cost(),
            cwd: ctx.cwd(),
            project: ctx.project_kind(),
            branch: git_branch(ctx.cwd()).as_deref(),
        })
    }

    fn print_banner(&self) {
        println!(
            "{} {}",
            "termpilot".cyan().bold(),
            format!("v{}", env!("CARGO_PKG_VERSION")).dark_grey()
        );
        println!(
            "{}",
            format!(
                "model {} · /help for commands · exit to quit",
                self.agent.config().model
            )
            .dark_grey()
        );
        if self.session.message_count() > 0 {
            println!(
                "{}",
                format!(
                    "resumed {} ({} messages)",
                    self.session.id,
                    self.session.message_count()
                )
                .dark_grey()
            );
        }
        println!();
    }
}

/// Print one chat event.
pub fn render_event(event: ChatEvent, thinking: &mut Option<Thinking>, out: &mut impl std::io::Write) {
    match event {
        ChatEvent::Attached(path) => {
            if let Some(spinner) = thinking.as_mut() {
                spinner.stop();
            }
            let _ = writeln!(out, "{}", format!("  ✓ @{}", path.display()).dark_grey());
            if thinking.is_some() {
                *thinking = Some(Thinking::start("Thinking..."));
            }
        }
        ChatEvent::FirstToken => {
            if let Some(spinner) = thinking.as_mut() {
                spinner.stop();
            }
        }
        ChatEvent::Text(text) => {
            let _ = write!(out, "{text}");
            let _ = out.flush();
        }
        ChatEvent::ToolsStart { .. } => {
            let _ = writeln!(out, "\n\n{}", "─── Executing ───".cyan());
        }
        ChatEvent::ToolResult { name, output } => {
            let _ = writeln!(out, "{} {output}", format!("[{name}]").green());
        }
        ChatEvent::ToolsDone => {
            let _ = writeln!(out, "{}\n", "─────────────────".cyan());
            if thinking.is_some() {
                *thinking = Some(Thinking::start("Summarizing..."));
            }
        }
        ChatEvent::Usage { .. } => {}
    }
}

/// Read one logical line. A trailing `\` continues onto the next line.
///
/// Returns `None` at end of input.
pub fn read_input<B: BufRead>(lines: &mut std::io::Lines<B>) -> anyhow::Result<Option<String>> {
    print!("{} ", "❯".green().bold());
    std::io::stdout().flush()?;

    let mut buffer = String::new();
    loop {
        let Some(line) = lines.next().transpose()? else {
            return Ok((!buffer.is_empty()).then_some(buffer));
        };
        match line.strip_suffix('\\') {
            Some(head) => {
                buffer.push_str(head);
                buffer.push('\n');
                print!("{} ", "…".dark_grey());
                std::io::stdout().flush()?;
            }
            None => {
                buffer.push_str(&line);
                return Ok(Some(buffer));
            }
        }
    }
}

/// Lines shown before `/edit` asks for new contents.
const EDIT_PREVIEW_LINES: usize = 25;

/// Numbered head of an existing file, or `New file`.
#[must_use]
pub fn edit_preview(path: &Path) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return "New file".to_string();
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut out = String::new();
    for (i, line) in lines.iter().take(EDIT_PREVIEW_LINES).enumerate() {
        out.push_str(&format!("{:>3}│ {line}\n", i + 1));
    }
    if lines.len() > EDIT_PREVIEW_LINES {
        out.push_str(&format!("... +{} more\n", lines.len() - EDIT_PREVIEW_LINES));
    }
    out
}

/// Read lines until `/save`. Returns `None` on `/cancel` or end of input.
pub fn read_edit_body<B: BufRead>(lines: &mut std::io::Lines<B>) -> anyhow::Result<Option<String>> {
    let mut content = String::new();
    loop {
        print!("{} ", " │".dark_grey());
        std::io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            return Ok(None);
        };
        match line.as_str() {
            "/save" => return Ok(Some(content)),
            "/cancel" => return Ok(None),
            _ => {
                content.push_str(&line);
                content.push('\n');
            }
        }
    }
}

fn describe_mode(mode: PermissionMode) -> String {
    let note = match mode {
        PermissionMode::Unrestricted => "everything runs",
        PermissionMode::ConfirmEach => "mutating operations ask first",
        PermissionMode::Blocked => "mutating operations are refused",
    };
    format!("{mode} ({note})")
}

#[cfg(feature = "clipboard")]
fn copy_to_clipboard(text: &str) -> anyhow::Result<()> {
    arboard::Clipboard::new()
        .and_then(|mut cb| cb.set_text(text.to_string()))
        .map_err(|e| anyhow::anyhow!("clipboard unavailable: {e}"))
}

#[cfg(not(feature = "clipboard"))]
fn copy_to_clipboard(_text: &str) -> anyhow::Result<()> {
    anyhow::bail!("built without clipboard support")
}

/// Values shown in the status line.
pub struct Status<'a> {
    pub mode: PermissionMode,
    pub tokens: u32,
    pub max_tokens: u32,
    pub cost: f64,
    pub cwd: &'a Path,
    pub project: Option<&'a str>,
    pub branch: Option<&'a str>,
}

/// `mode │ tokens/max │ $cost │ cwd [project] ⎇ branch`
#[must_use]
pub fn format_status(status: &Status<'_>) -> String {
    let mut line = format!(
        "{} │ {}/{} │ ${:.4} │ {}",
        status.mode,
        compact_count(status.tokens),
        compact_count(status.max_tokens),
        status.cost,
        shorten_home(status.cwd),
    );
    if let Some(project) = status.project {
        line.push_str(&format!(" [{project}]"));
    }
    if let Some(branch) = status.branch {
        line.push_str(&format!(" ⎇ {branch}"));
    }
    line
}

/// `950`, `1.2k`, `128k`.
fn compact_count(n: u32) -> String {
    match n {
        0..1_000 => n.to_string(),
        _ if n % 1_000 == 0 => format!("{}k", n / 1_000),
        _ => format!("{:.1}k", f64::from(n) / 1_000.0),
    }
}

fn shorten_home(path: &Path) -> String {
    match dirs::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => path.display().to_string(),
    }
}

/// Newest-first session table, at most `limit` rows.
#[must_use]
pub fn format_session_list(sessions: &[Session], limit: usize) -> String {
    if sessions.is_empty() {
        return "No saved sessions\n".to_string();
    }

    let mut out = String::new();
    for session in sessions.iter().take(limit) {
        out.push_str(&format!(
            "{}  {}  {:>3} msgs  {}\n",
            session.id,
            session.updated.format("%Y-%m-%d %H:%M"),
            session.message_count(),
            session.working_directory.display()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn status_line_shows_all_parts() {
        let line = format_status(&Status {
            mode: PermissionMode::ConfirmEach,
            tokens: 1_234,
            max_tokens: 128_000,
            cost: 0.000_123,
            cwd: Path::new("/srv/app"),
            project: Some("rust"),
            branch: Some("main"),
        });
        assert_eq!(line, "confirm-each │ 1.2k/128k │ $0.0001 │ /srv/app [rust] ⎇ main");
    }

    #[test]
    fn status_line_omits_missing_parts() {
        let line = format_status(&Status {
            mode: PermissionMode::Blocked,
            tokens: 0,
            max_tokens: 128_000,
            cost: 0.0,
            cwd: Path::new("/srv"),
            project: None,
            branch: None,
        });
        assert_eq!(line, "blocked │ 0/128k │ $0.0000 │ /srv");
    }

    #[test]
    fn read_input_joins_continuation_lines() {
        let mut lines = Cursor::new("first\\\nsecond\nthird\n").lines();
        assert_eq!(
            read_input(&mut lines).unwrap(),
            Some("first\nsecond".to_string())
        );
        assert_eq!(read_input(&mut lines).unwrap(), Some("third".to_string()));
        assert_eq!(read_input(&mut lines).unwrap(), None);
    }

    #[test]
    fn render_event_writes_text_and_results() {
        let mut out = Vec::new();
        let mut thinking = None;
        render_event(ChatEvent::Text("hello".to_string()), &mut thinking, &mut out);
        render_event(
            ChatEvent::ToolResult {
                name: "ls".to_string(),
                output: "a/".to_string(),
            },
            &mut thinking,
            &mut out,
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("hello"));
        assert!(text.contains("a/"));
    }

    #[test]
    fn attached_files_pause_the_spinner() {
        let mut out = Vec::new();
        let mut thinking = Some(Thinking::start("Thinking..."));
        render_event(
            ChatEvent::Attached(PathBuf::from("/w/notes.md")),
            &mut thinking,
            &mut out,
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("@/w/notes.md"));
        assert!(thinking.as_ref().is_some_and(Thinking::is_running));
        drop(thinking);
    }

    #[test]
    fn edit_body_ends_at_save_or_cancel() {
        let mut lines = Cursor::new("fn main() {}\n\n/save\nafter\n").lines();
        assert_eq!(
            read_edit_body(&mut lines).unwrap(),
            Some("fn main() {}\n\n".to_string())
        );

        let mut lines = Cursor::new("draft\n/cancel\n").lines();
        assert_eq!(read_edit_body(&mut lines).unwrap(), None);

        let mut lines = Cursor::new("draft\n").lines();
        assert_eq!(read_edit_body(&mut lines).unwrap(), None);
    }

    #[test]
    fn edit_preview_numbers_and_caps_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("long.txt");
        let body: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&file, body).unwrap();

        let preview = edit_preview(&file);
        assert!(preview.starts_with("  1│ line 1\n"));
        assert!(preview.contains(" 25│ line 25\n"));
        assert!(!preview.contains("line 26"));
        assert!(preview.ends_with("... +5 more\n"));

        assert_eq!(edit_preview(&dir.path().join("absent.txt")), "New file");
    }

    #[test]
    fn session_list_is_capped() {
        let sessions: Vec<Session> = (0..3).map(|_| Session::new(PathBuf::from("/w"))).collect();
        let out = format_session_list(&sessions, 2);
        assert_eq!(out.lines().count(), 2);
        assert_eq!(format_session_list(&[], 5), "No saved sessions\n");
    }

    #[test]
    fn compact_counts() {
        assert_eq!(compact_count(950), "950");
        assert_eq!(compact_count(1_234), "1.2k");
        assert_eq!(compact_count(128_000), "128k");
    }
}
