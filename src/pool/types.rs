use crate::llm::{ChunkCallback, GenerationResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Caller-supplied description of the task being benchmarked.
///
/// Opaque to the core apart from `name` (logging) and `description` (prompt
/// rendering); everything else about a task lives in the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskManifest {
    pub name: String,
    pub description: String,
}

/// One prior attempt at a task, as recorded by the harness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub extracted_code: String,
    pub failure_reasons: Vec<String>,
}

/// Scheduling hint carried by a work item. Admission stays FIFO; the hint
/// is for callers deciding what to submit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// One unit of dispatch: a task, a provider, a model, an attempt number.
/// Immutable once submitted.
#[derive(Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub task: Arc<TaskManifest>,
    pub provider: String,
    pub model: String,
    /// 1 = fresh generation; >1 = fix of the previous failed attempt.
    pub attempt: u32,
    /// Ordered prior attempts for this task.
    pub history: Vec<ExecutionAttempt>,
    pub priority: WorkPriority,
    pub created_at: DateTime<Utc>,
    /// Caller's token estimate; derived from the prompt when absent.
    pub estimated_tokens: Option<u64>,
    /// Invoked with each streamed fragment when the provider streams.
    pub on_chunk: Option<ChunkCallback>,
}

impl WorkItem {
    pub fn new(
        task: Arc<TaskManifest>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            provider: provider.into(),
            model: model.into(),
            attempt: 1,
            history: Vec::new(),
            priority: WorkPriority::default(),
            created_at: Utc::now(),
            estimated_tokens: None,
            on_chunk: None,
        }
    }

    /// Mark this item as a fix of previous failed attempts.
    pub fn with_attempt(mut self, attempt: u32, history: Vec<ExecutionAttempt>) -> Self {
        self.attempt = attempt;
        self.history = history;
        self
    }

    pub fn with_priority(mut self, priority: WorkPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_tokens(mut self, estimated_tokens: u64) -> Self {
        self.estimated_tokens = Some(estimated_tokens);
        self
    }

    pub fn with_chunk_callback(mut self, on_chunk: ChunkCallback) -> Self {
        self.on_chunk = Some(on_chunk);
        self
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("task", &self.task.name)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("attempt", &self.attempt)
            .field("priority", &self.priority)
            .field("has_chunk_callback", &self.on_chunk.is_some())
            .finish()
    }
}

/// Outcome of one work item. Exactly one is produced per execution
/// (including each retry); only the last is returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResult {
    pub success: bool,
    pub model: String,
    /// Extracted and cleaned code; may be empty on failure.
    pub code: String,
    /// Full synthesized provider response, when one was produced.
    pub response: Option<GenerationResponse>,
    /// Wall time for this item, including retries and backoff.
    pub elapsed: Duration,
    /// Success, confidence at or above threshold, and non-empty code.
    pub ready_for_compile: bool,
    pub continuation_rounds: u32,
    pub truncation_warning: Option<String>,
    pub error: Option<String>,
}

impl WorkResult {
    pub(crate) fn failure(model: &str, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            model: model.to_string(),
            code: String::new(),
            response: None,
            elapsed,
            ready_for_compile: false,
            continuation_rounds: 0,
            truncation_warning: None,
            error: Some(error.into()),
        }
    }
}

/// Errors surfaced by [`WorkPool`](crate::pool::WorkPool) entry points.
///
/// Everything else is reduced to a failed [`WorkResult`]; only the
/// deliberate shutting-down rejection escapes as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("work pool is shutting down")]
    ShuttingDown,
}
