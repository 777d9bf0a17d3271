use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One generation request, provider-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub model: String,
    pub prompt: String,
    pub system_message: Option<String>,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            prompt: prompt.into(),
            system_message: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Caller-supplied correlation info passed alongside every request.
///
/// Providers may use it for audit logging; the core never reads it back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub task: Option<String>,
    pub attempt: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// Natural end of output.
    Stop,
    /// Output was cut off by a length limit; a continuation round may
    /// recover the rest.
    Length,
    ContentFilter,
    Error,
}

/// Token usage for one request, or summed across continuation rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Completed response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    pub duration: Duration,
}

/// One event on a provider's response stream.
///
/// A well-formed stream yields any number of `Delta` fragments followed by
/// exactly one terminal `Done` event carrying usage and the finish reason.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Delta(String),
    Done {
        usage: TokenUsage,
        finish_reason: FinishReason,
    },
}

/// Boxed provider response stream.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// Callback invoked with each streamed text fragment, in receipt order.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Errors surfaced by provider implementations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider '{0}' does not support streaming")]
    StreamingUnsupported(String),
    #[error("{0}")]
    Other(String),
}
