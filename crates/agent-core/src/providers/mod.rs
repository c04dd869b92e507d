//! Completion provider implementations.

mod chat_completions;

pub use chat_completions::{ChatCompletionsProvider, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
