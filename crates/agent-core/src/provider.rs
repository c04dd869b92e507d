//! Completion provider abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::Result;
use super::types::{Message, Usage};

/// Configuration for one completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature, omitted from the request when `None`.
    pub temperature: Option<f32>,
    /// Conversation messages, system turn first.
    pub messages: Vec<Message>,
}

/// A streaming event from the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// A chunk of text content.
    TextDelta(String),
    /// Latest cumulative usage for the request.
    Usage(Usage),
    /// The completion has finished.
    Done,
}

/// Stream of completion events.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionEvent>> + Send>>;

/// Trait for completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &'static str;

    /// Stream a completion request.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream>;
}
