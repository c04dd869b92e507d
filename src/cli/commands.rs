//! Slash commands typed at the prompt.

use agent_core::directive::Directive;
use agent_core::permission::PermissionMode;

use crate::core::agent::Operation;

/// Help text for `/help`.
pub const HELP: &str = "\
Commands:
  /mode [name]        cycle or set the approval mode (unrestricted, confirm-each, blocked)
  /undo               undo the last file change
  /edit <file>        type new contents for a file, end with /save or /cancel
  /save               save this session
  /export [file]      export the transcript as Markdown
  /copy               copy the last response to the clipboard
  /memory             list remembered facts
  /remember key=value remember a fact
  /forget key         forget a fact
  /sessions           list saved sessions
  /clear              clear the conversation
  /context            show directory, project and branch
  /cost               show tokens and cost
  /pwd                print the working directory
  /help               show this help

Tools:
  /read /ls /tree /find /grep /run /git /cd /fetch /python /node /search /img

Input:
  end a line with \\ to continue on the next one
  @path attaches a file to the message
  exit or quit leaves";

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    /// Cycle the mode, or set it when named.
    Mode(Option<PermissionMode>),
    Undo,
    /// Replace a file's contents with lines typed at the prompt.
    Edit(String),
    Save,
    Export(Option<String>),
    Copy,
    Memory,
    Remember { key: String, value: String },
    Forget(String),
    Sessions,
    Clear,
    Context,
    Cost,
    Pwd,
    Help,
    /// A tool run directly through the gate.
    Tool(Operation),
    /// Text to print instead of running anything.
    Invalid(String),
}

/// Tool names accepted as slash commands.
const TOOL_COMMANDS: &[&str] = &[
    "read", "ls", "list", "tree", "find", "grep", "run", "git", "cd", "fetch", "python", "node",
    "search", "img", "image",
];

impl SlashCommand {
    /// Parse input that starts with `/`.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let body = input.trim().trim_start_matches('/');
        let (name, rest) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(n, r)| (n, r.trim()));
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        match name {
            "mode" => match arg.map(|a| a.parse::<PermissionMode>()) {
                None => Self::Mode(None),
                Some(Ok(mode)) => Self::Mode(Some(mode)),
                Some(Err(e)) => Self::Invalid(e),
            },
            "undo" => Self::Undo,
            "edit" => match arg {
                Some(path) => Self::Edit(path),
                None => Self::Invalid("Usage: /edit <file>".to_string()),
            },
            "save" => Self::Save,
            "export" => Self::Export(arg),
            "copy" => Self::Copy,
            "memory" => Self::Memory,
            "remember" => match rest.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => Self::Remember {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                },
                _ => Self::Invalid("Usage: /remember key=value".to_string()),
            },
            "forget" => match arg {
                Some(key) => Self::Forget(key),
                None => Self::Invalid("Usage: /forget key".to_string()),
            },
            "sessions" => Self::Sessions,
            "clear" => Self::Clear,
            "context" => Self::Context,
            "cost" => Self::Cost,
            "pwd" => Self::Pwd,
            "help" | "?" => Self::Help,
            tool if TOOL_COMMANDS.contains(&tool) => {
                match Operation::parse(&Directive::new(tool, rest)) {
                    Ok(op) => Self::Tool(op),
                    Err(message) => Self::Invalid(message),
                }
            }
            other => Self::Invalid(format!("Unknown command: /{other} (try /help)")),
        }
    }
}
