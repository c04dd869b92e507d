//! Chat agent: streams model turns and runs the directives they carry.
//!
//! One user turn is either a single assistant reply, or (when the reply holds
//! directives) the reply, a synthetic results turn, and a summary reply. A
//! transport failure at either completion rolls history back to where the turn
//! started.

mod mentions;
pub mod tools;
mod types;

use agent_core::conversation::Conversation;
use agent_core::directive;
use agent_core::error::Result;
use agent_core::permission::PermissionMode;
use agent_core::provider::{CompletionEvent, CompletionRequest, LlmProvider};
use futures::StreamExt;

pub use mentions::{Expanded, expand_mentions, parse_at_mentions};
pub use tools::{Confirm, Operation, ToolContext, ToolRegistry, blocked};
pub use types::{ChatEvent, Message, Role};

use crate::config::AgentConfig;
use crate::core::context::system_prompt;
use crate::core::session::Session;

/// Closing instruction of the synthetic results turn.
const SUMMARY_INSTRUCTION: &str = "Briefly summarize what was done.";

/// Build the synthetic user turn that carries labeled directive results.
#[must_use]
pub fn results_turn(results: &[String]) -> String {
    format!("Results:\n{}\n\n{SUMMARY_INSTRUCTION}", results.join("\n\n"))
}

/// Agent that orchestrates conversation with an LLM.
pub struct Agent {
    provider: Box<dyn LlmProvider>,
    conversation: Conversation,
    tools: ToolRegistry,
    ctx: ToolContext,
    config: AgentConfig,
    token_count: u32,
    cost: f64,
}

impl Agent {
    /// Create an agent over `ctx`, with a system prompt built from it.
    pub fn new(provider: Box<dyn LlmProvider>, config: AgentConfig, ctx: ToolContext) -> Self {
        let mut agent = Self {
            provider,
            conversation: Conversation::new(),
            tools: ToolRegistry::new(),
            ctx,
            config,
            token_count: 0,
            cost: 0.0,
        };
        agent.refresh_system_prompt();
        agent
    }

    /// Rebuild the system turn from the current directory, mode, and memory.
    pub fn refresh_system_prompt(&mut self) {
        let prompt = system_prompt(&self.ctx.workspace, self.ctx.gate.mode(), &self.ctx.memory);
        self.conversation.set_system(prompt);
    }

    /// Conversation history, system turn included.
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Shared operation state.
    #[must_use]
    pub const fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Provider name, for display.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Model settings.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Current approval mode.
    #[must_use]
    pub const fn mode(&self) -> PermissionMode {
        self.ctx.gate.mode()
    }

    /// Replace the approval mode.
    pub fn set_mode(&mut self, mode: PermissionMode) {
        self.ctx.gate.set_mode(mode);
        tracing::info!(mode = %mode, "permission mode changed");
        self.refresh_system_prompt();
    }

    /// Advance to the next approval mode and return it.
    pub fn cycle_mode(&mut self) -> PermissionMode {
        let mode = self.ctx.gate.cycle();
        tracing::info!(mode = %mode, "permission mode changed");
        self.refresh_system_prompt();
        mode
    }

    /// Latest reported token count.
    #[must_use]
    pub const fn token_count(&self) -> u32 {
        self.token_count
    }

    /// Running cost estimate in USD.
    #[must_use]
    pub const fn cost(&self) -> f64 {
        self.cost
    }

    /// Text of the last assistant turn.
    #[must_use]
    pub fn last_response(&self) -> Option<&str> {
        self.conversation.last_assistant()
    }

    /// Undo the most recent file mutation.
    pub fn undo(&mut self) -> String {
        match self.ctx.undo.undo_last() {
            Ok(outcome) => outcome.to_string(),
            Err(e) => format!("Error: {e}"),
        }
    }

    /// Remember a fact.
    pub fn remember(&mut self, key: &str, value: &str) {
        self.ctx.remember(key, value);
        self.refresh_system_prompt();
    }

    /// Forget a fact. Returns whether it existed.
    pub fn forget(&mut self, key: &str) -> bool {
        let existed = self.ctx.forget(key);
        if existed {
            self.refresh_system_prompt();
        }
        existed
    }

    /// Drop all turns but the system prompt, and reset counters.
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.token_count = 0;
        self.cost = 0.0;
    }

    /// Drop history past `len`, discarding a turn that was cut short.
    pub fn rewind(&mut self, len: usize) {
        self.conversation.truncate(len);
    }

    /// Run one operation directly, outside a model turn.
    pub async fn run_operation(&mut self, op: Operation, confirm: &dyn Confirm) -> String {
        let output = self.tools.run(op, &mut self.ctx, confirm).await;
        self.refresh_system_prompt();
        output
    }

    /// Copy the agent's state into `session`.
    pub fn save_into(&self, session: &mut Session) {
        session.working_directory = self.ctx.workspace.cwd().to_path_buf();
        session.mode = self.mode();
        session.history = self.conversation.clone();
        session.token_count = self.token_count;
        session.cost_estimate = self.cost;
        session.memory = self.ctx.memory.clone();
    }

    /// Resume from `session`: history, counters, mode, and directory.
    ///
    /// The memory store on disk stays authoritative; the session copy is
    /// only a record.
    pub fn restore(&mut self, session: &Session) {
        self.conversation = session.history.clone();
        self.token_count = session.token_count;
        self.cost = session.cost_estimate;
        self.ctx.gate.set_mode(session.mode);
        if session.working_directory.is_dir() {
            self.ctx.workspace.change_dir(session.working_directory.clone());
        } else {
            tracing::warn!(
                dir = %session.working_directory.display(),
                "session directory is gone, staying put"
            );
        }
        self.refresh_system_prompt();
        tracing::info!(id = %session.id, messages = session.message_count(), "resumed session");
    }

    /// Run one user turn.
    ///
    /// `@path` mentions are expanded first. Returns the final assistant text:
    /// the visible reply, or the summary after a directive batch.
    ///
    /// # Errors
    ///
    /// Returns error if either completion request fails. History is rolled
    /// back to its length before the turn; side effects of directives that
    /// already ran are not undone.
    pub async fn chat<F>(&mut self, input: &str, mut on_event: F, confirm: &dyn Confirm) -> Result<String>
    where
        F: FnMut(ChatEvent),
    {
        let checkpoint = self.conversation.len();

        let expanded = expand_mentions(input, self.ctx.workspace.cwd(), self.ctx.limits.mention_lines);
        for path in expanded.attached {
            on_event(ChatEvent::Attached(path));
        }
        self.conversation.add_user_message(expanded.text);

        let reply = match self.complete(&mut on_event).await {
            Ok(reply) => reply,
            Err(e) => {
                self.rollback(checkpoint, &e);
                return Err(e);
            }
        };

        let parsed = directive::parse(&reply);
        if !parsed.has_directives() {
            self.conversation.add_assistant_message(parsed.visible.clone());
            return Ok(parsed.visible);
        }

        on_event(ChatEvent::ToolsStart {
            count: parsed.directives.len(),
        });
        let mut results = Vec::with_capacity(parsed.directives.len());
        for directive in &parsed.directives {
            let output = self.tools.execute(directive, &mut self.ctx, confirm).await;
            on_event(ChatEvent::ToolResult {
                name: directive.name.clone(),
                output: output.clone(),
            });
            results.push(format!("[{}] {output}", directive.name));
        }
        on_event(ChatEvent::ToolsDone);

        // a cd or remember may have changed what the prompt describes
        self.refresh_system_prompt();

        self.conversation.add_assistant_message(reply);
        self.conversation.add_user_message(results_turn(&results));

        let summary = match self.complete(&mut on_event).await {
            Ok(summary) => summary,
            Err(e) => {
                self.rollback(checkpoint, &e);
                return Err(e);
            }
        };
        self.conversation.add_assistant_message(summary.clone());
        Ok(summary)
    }

    fn rollback(&mut self, checkpoint: usize, error: &agent_core::error::AgentError) {
        tracing::warn!(error = %error, "completion failed, rolling back turn");
        self.conversation.truncate(checkpoint);
    }

    /// Stream one completion over the current history.
    async fn complete<F>(&mut self, on_event: &mut F) -> Result<String>
    where
        F: FnMut(ChatEvent),
    {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: self.conversation.messages().to_vec(),
        };

        tracing::debug!(
            provider = self.provider.name(),
            messages = request.messages.len(),
            "sending completion request"
        );

        let mut stream = self.provider.stream(request).await?;
        let mut text = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                CompletionEvent::TextDelta(delta) => {
                    if text.is_empty() {
                        on_event(ChatEvent::FirstToken);
                    }
                    text.push_str(&delta);
                    on_event(ChatEvent::Text(delta));
                }
                CompletionEvent::Usage(usage) => {
                    self.token_count = usage.total_tokens;
                    self.cost = self.config.cost_for(usage.total_tokens);
                    on_event(ChatEvent::Usage {
                        total_tokens: self.token_count,
                        cost_usd: self.cost,
                    });
                }
                CompletionEvent::Done => break,
            }
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use agent_core::error::AgentError;
    use agent_core::provider::CompletionStream;
    use agent_core::types::Usage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crate::config::Limits;

    /// A scripted reply: streamed text, or an API failure.
    enum Reply {
        Text(&'static str),
        Fail,
        /// A stream that never produces anything.
        Hang,
    }

    #[derive(Clone)]
    struct ScriptedProvider {
        replies: Arc<Mutex<VecDeque<Reply>>>,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
            self.requests.lock().push(request);
            match self.replies.lock().pop_front() {
                Some(Reply::Text(text)) => {
                    // split so the agent has to reassemble deltas
                    let (head, tail) = text.split_at(text.len() / 2);
                    let events = vec![
                        Ok(CompletionEvent::TextDelta(head.to_string())),
                        Ok(CompletionEvent::TextDelta(tail.to_string())),
                        Ok(CompletionEvent::Usage(Usage { total_tokens: 2000 })),
                        Ok(CompletionEvent::Done),
                    ];
                    Ok(Box::pin(futures::stream::iter(events)))
                }
                Some(Reply::Hang) => Ok(Box::pin(futures::stream::pending::<Result<CompletionEvent>>())),
                Some(Reply::Fail) | None => Err(AgentError::Api {
                    status: 500,
                    message: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn scripted_agent(dir: &TempDir, mode: PermissionMode, replies: Vec<Reply>) -> (Agent, ScriptedProvider) {
        let provider = ScriptedProvider::new(replies);
        let ctx = ToolContext::new(dir.path().to_path_buf(), mode, Limits::default());
        let agent = Agent::new(Box::new(provider.clone()), AgentConfig::default(), ctx);
        (agent, provider)
    }

    fn never(_: &str) -> bool {
        panic!("confirmation should not be requested")
    }

    fn roles(agent: &Agent) -> Vec<Role> {
        agent.conversation().messages().iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn plain_reply_is_one_assistant_turn() {
        let dir = TempDir::new().unwrap();
        let (mut agent, provider) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![Reply::Text(
            "Hello there.",
        )]);

        let reply = agent.chat("hi", |_| {}, &never).await.unwrap();

        assert_eq!(reply, "Hello there.");
        assert_eq!(roles(&agent), vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(provider.requests.lock().len(), 1);
        assert_eq!(agent.token_count(), 2000);
        assert!((agent.cost() - 0.0002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn directive_turn_runs_tools_then_summarizes() {
        let dir = TempDir::new().unwrap();
        let (mut agent, provider) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![
            Reply::Text("On it. <tool>write:out.txt|||hi</tool> <tool>read:out.txt</tool>"),
            Reply::Text("Wrote and read the file."),
        ]);

        let mut results = Vec::new();
        let reply = agent
            .chat(
                "make a file",
                |event| {
                    if let ChatEvent::ToolResult { name, .. } = event {
                        results.push(name);
                    }
                },
                &never,
            )
            .await
            .unwrap();

        assert_eq!(reply, "Wrote and read the file.");
        assert_eq!(results, vec!["write", "read"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "hi"
        );
        assert_eq!(roles(&agent), vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
        ]);

        let messages = agent.conversation().messages();
        // the original reply, markers included
        assert!(messages[2].content.contains("<tool>write:out.txt|||hi</tool>"));
        let synthetic = &messages[3].content;
        assert!(synthetic.starts_with("Results:\n[write] ✓ Written:"));
        assert!(synthetic.contains("\n\n[read] ─── "));
        assert!(synthetic.ends_with("\n\nBriefly summarize what was done."));

        let requests = provider.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn failed_first_completion_rolls_back() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![Reply::Fail]);
        let before = agent.conversation().len();

        let err = agent.chat("hi", |_| {}, &never).await.unwrap_err();

        assert!(matches!(err, AgentError::Api { status: 500, .. }));
        assert_eq!(agent.conversation().len(), before);
    }

    #[tokio::test]
    async fn failed_summary_rolls_back_whole_turn() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![
            Reply::Text("<tool>write:kept.txt|||x</tool>"),
            Reply::Fail,
        ]);
        let before = agent.conversation().len();

        assert!(agent.chat("go", |_| {}, &never).await.is_err());

        assert_eq!(agent.conversation().len(), before);
        // side effects are not rolled back
        assert!(dir.path().join("kept.txt").exists());
    }

    #[tokio::test]
    async fn blocked_mode_reports_denial_to_model() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Blocked, vec![
            Reply::Text("<tool>run:touch marker</tool>"),
            Reply::Text("I was not allowed."),
        ]);

        agent.chat("touch it", |_| {}, &never).await.unwrap();

        let synthetic = &agent.conversation().messages()[3].content;
        assert!(synthetic.contains("[run] [blocked] Run: touch marker"));
        assert!(!dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn cd_directive_refreshes_system_prompt() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/package.json"), "{}").unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![
            Reply::Text("<tool>cd:web</tool>"),
            Reply::Text("Moved."),
        ]);

        agent.chat("go to web", |_| {}, &never).await.unwrap();

        assert_eq!(agent.context().workspace.cwd(), dir.path().join("web"));
        let system = agent.conversation().system().unwrap();
        assert!(system.contains("Project: nodejs"));
    }

    #[tokio::test]
    async fn mentions_are_expanded_into_user_turn() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.md"), "remember the milk").unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![Reply::Text("Ok.")]);

        let mut attached = Vec::new();
        agent
            .chat(
                "summarize @notes.md",
                |event| {
                    if let ChatEvent::Attached(path) = event {
                        attached.push(path);
                    }
                },
                &never,
            )
            .await
            .unwrap();

        assert_eq!(attached, vec![dir.path().join("notes.md")]);
        assert!(agent.conversation().messages()[1]
            .content
            .contains("remember the milk"));
    }

    #[tokio::test]
    async fn undo_reverts_directive_write() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![
            Reply::Text("<tool>write:new.txt|||data</tool>"),
            Reply::Text("Done."),
        ]);

        agent.chat("write it", |_| {}, &never).await.unwrap();
        assert!(dir.path().join("new.txt").exists());

        assert!(agent.undo().starts_with("Undone: removed"));
        assert!(!dir.path().join("new.txt").exists());
        assert_eq!(agent.undo(), "Nothing to undo");
    }

    #[tokio::test]
    async fn cancelled_turn_can_be_rewound() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![Reply::Hang]);
        let checkpoint = agent.conversation().len();

        let cut = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            agent.chat("hi", |_| {}, &never),
        )
        .await;

        assert!(cut.is_err());
        assert_eq!(roles(&agent), vec![Role::System, Role::User]);
        agent.rewind(checkpoint);
        assert_eq!(roles(&agent), vec![Role::System]);
    }

    #[test]
    fn mode_and_memory_changes_refresh_prompt() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![]);

        assert_eq!(agent.cycle_mode(), PermissionMode::ConfirmEach);
        assert!(agent.conversation().system().unwrap().contains("Mode: confirm-each"));

        agent.remember("shell", "zsh");
        assert!(agent.conversation().system().unwrap().contains("- shell: zsh"));

        assert!(agent.forget("shell"));
        assert!(!agent.conversation().system().unwrap().contains("MEMORY:"));
    }

    #[test]
    fn session_round_trip_restores_state() {
        let dir = TempDir::new().unwrap();
        let (mut agent, _) = scripted_agent(&dir, PermissionMode::Blocked, vec![]);
        agent.conversation.add_user_message("earlier");
        agent.token_count = 42;

        let mut session = Session::new(dir.path().to_path_buf());
        agent.save_into(&mut session);

        let (mut fresh, _) = scripted_agent(&dir, PermissionMode::Unrestricted, vec![]);
        fresh.restore(&session);

        assert_eq!(fresh.mode(), PermissionMode::Blocked);
        assert_eq!(fresh.token_count(), 42);
        assert_eq!(fresh.conversation().messages()[1].content, "earlier");
        assert!(fresh.conversation().system().unwrap().contains("Mode: blocked"));
    }

    #[test]
    fn results_turn_format() {
        let turn = results_turn(&["[ls] a".to_string(), "[read] b".to_string()]);
        assert_eq!(
            turn,
            "Results:\n[ls] a\n\n[read] b\n\nBriefly summarize what was done."
        );
    }
}
