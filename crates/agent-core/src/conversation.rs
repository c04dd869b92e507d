//! Conversation state management.

use serde::{Deserialize, Serialize};

use crate::types::{Message, Role};

/// Ordered message history with an optional system turn at index 0.
///
/// The system turn is regenerated in place; every other message is only ever
/// appended, or dropped wholesale by [`Conversation::truncate`] when a turn is
/// rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create a new conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation with a system prompt.
    #[must_use]
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system)],
        }
    }

    /// Get the system prompt.
    #[must_use]
    pub fn system(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Set or replace the system prompt at index 0.
    pub fn set_system(&mut self, system: impl Into<String>) {
        let message = Message::system(system);
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => *first = message,
            _ => self.messages.insert(0, message),
        }
    }

    /// Get all messages, system turn included.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Add a user message.
    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Add an assistant message.
    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Total number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Drop everything past `len` messages.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Last assistant message, if any.
    #[must_use]
    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Clear all messages except the system turn.
    pub fn clear(&mut self) {
        let keep = usize::from(self.system().is_some());
        self.messages.truncate(keep);
    }

    /// Check if the conversation has any non-system messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.iter().all(|m| m.role == Role::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_tracks_messages() {
        let mut conv = Conversation::new();

        conv.add_user_message("Hello");
        conv.add_assistant_message("Hi there!");

        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.messages()[0].role, Role::User);
        assert_eq!(conv.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn system_prompt_is_replaced_in_place() {
        let mut conv = Conversation::with_system("v1");
        conv.add_user_message("Hello");
        conv.set_system("v2");

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.system(), Some("v2"));
        assert_eq!(conv.messages()[1].content, "Hello");
    }

    #[test]
    fn set_system_inserts_when_missing() {
        let mut conv = Conversation::new();
        conv.add_user_message("Hello");
        conv.set_system("sys");

        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn clear_keeps_system_turn() {
        let mut conv = Conversation::with_system("sys");
        conv.add_user_message("Hello");
        conv.clear();

        assert!(conv.is_empty());
        assert_eq!(conv.system(), Some("sys"));
    }

    #[test]
    fn truncate_rolls_back() {
        let mut conv = Conversation::with_system("sys");
        let checkpoint = conv.len();
        conv.add_user_message("doomed");
        conv.truncate(checkpoint);

        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn serializes_as_plain_message_list() {
        let mut conv = Conversation::new();
        conv.add_user_message("hi");
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json, serde_json::json!([{ "role": "user", "content": "hi" }]));
    }
}
