//! Chat Completions provider.
//!
//! Streams completions from any endpoint that speaks the Chat Completions
//! wire format over server-sent events.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::provider::{CompletionEvent, CompletionRequest, CompletionStream, LlmProvider};
use crate::types::{Message, Usage};

/// Default endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default whole-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Provider for Chat Completions compatible endpoints.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatCompletionsProvider {
    /// Create a provider against the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a provider with an explicit endpoint and request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client can't be built.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AgentError::ApiKeyMissing);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            api_key,
            base_url,
        })
    }

    /// Endpoint base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| AgentError::ApiKeyMissing)?,
        );
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of decoding one SSE line.
#[derive(Debug, PartialEq)]
enum Line {
    /// Blank, comment, or non-data field.
    Skip,
    /// Events carried by a data chunk.
    Events(Vec<CompletionEvent>),
    /// The `[DONE]` sentinel.
    Done,
}

/// Pop the next complete line off `buffer`, without its terminator.
fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=end).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Decode one SSE line into completion events.
fn decode_line(line: &str) -> Result<Line> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Line::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(Line::Skip);
    }
    if data == "[DONE]" {
        return Ok(Line::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| {
        tracing::debug!(data = %data, error = %e, "malformed stream chunk");
        AgentError::Parse(format!("malformed stream chunk: {e}"))
    })?;

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(CompletionEvent::TextDelta(text));
        }
    }
    if let Some(usage) = chunk.usage.filter(|u| u.total_tokens > 0) {
        events.push(CompletionEvent::Usage(usage));
    }

    Ok(Line::Events(events))
}

/// Turn a raw SSE byte stream into completion events.
///
/// The stream must end with `[DONE]`. If the connection closes before it
/// does, a trailing unterminated line is still decoded and then
/// [`AgentError::StreamEnded`] is yielded instead of `Done`.
fn sse_events<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<CompletionEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<AgentError> + Send + 'static,
{
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;
        futures::pin_mut!(byte_stream);

        'outer: while let Some(chunk) = byte_stream.next().await {
            match chunk {
                Ok(bytes) => buffer.extend_from_slice(bytes.as_ref()),
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }

            while let Some(line) = next_line(&mut buffer) {
                match decode_line(&line) {
                    Ok(Line::Skip) => {}
                    Ok(Line::Done) => {
                        done = true;
                        break 'outer;
                    }
                    Ok(Line::Events(events)) => {
                        for event in events {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if !done && !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).trim_end_matches('\r').to_string();
            match decode_line(&line) {
                Ok(Line::Skip) => {}
                Ok(Line::Done) => done = true,
                Ok(Line::Events(events)) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if done {
            yield Ok(CompletionEvent::Done);
        } else {
            tracing::warn!("completion stream closed before [DONE]");
            yield Err(AgentError::StreamEnded);
        }
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let body = ChatRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream: true,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(url = %url, messages = request.messages.len(), "sending completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::pin(sse_events(response.bytes_stream())))
    }
}
