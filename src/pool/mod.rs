//! Work pool: the orchestration surface of the dispatch core.
//!
//! The pool admits work items under a global concurrency ceiling, reserves
//! per-provider rate-limit capacity for each one, drives the request
//! through the continuation handler, classifies failures, retries
//! transient ones, and reduces every outcome to a [`WorkResult`] at the
//! boundary. Batches fan out concurrently with failures isolated per item,
//! and [`drain`](WorkPool::drain) provides graceful shutdown.
//!
//! ```text
//! submit(item)
//!      │
//!      ▼
//! admission Semaphore ──► RateLimiter lease ──► ContinuationHandler
//!                                                      │
//!                                                      ▼
//!                                                  Provider
//!                                                      │
//!      WorkResult ◄── CodeExtractor ◄──────────────────┘
//! ```

pub mod types;

mod classify;
mod prompt;

pub use types::{
    ExecutionAttempt, PoolError, TaskManifest, WorkItem, WorkPriority, WorkResult,
};

use crate::config::DispatchConfig;
use crate::continuation::ContinuationHandler;
use crate::extract::CodeExtractor;
use crate::limiter::{RateLimiter, RateLimitLease};
use crate::llm::{GenerationRequest, Provider, ProviderError, RequestContext};
use crate::sync::Semaphore;
use classify::{ErrorClass, classify_error};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};


/// Extractions below this confidence are model failures.
const READY_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Rough chars-per-token ratio used for default estimates.
const CHARS_PER_TOKEN: u64 = 4;

/// Completion allowance added to prompt-derived token estimates.
const COMPLETION_ALLOWANCE: u64 = 1_024;

/// Dispatches work items to providers under global and per-provider limits.
pub struct WorkPool {
    config: DispatchConfig,
    providers: HashMap<String, Arc<dyn Provider>>,
    limiter: Arc<RateLimiter>,
    extractor: Arc<dyn CodeExtractor>,
    continuation: ContinuationHandler,
    admission: Semaphore,
    active: watch::Sender<usize>,
    shutting_down: AtomicBool,
}

/// Decrements the in-flight count on every exit path.
struct ActiveGuard<'a> {
    active: &'a watch::Sender<usize>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count -= 1);
    }
}

impl WorkPool {
    /// Build a pool with an explicitly constructed rate limiter.
    pub fn new(
        config: DispatchConfig,
        providers: HashMap<String, Arc<dyn Provider>>,
        limiter: Arc<RateLimiter>,
        extractor: Arc<dyn CodeExtractor>,
    ) -> Self {
        let admission = Semaphore::new(config.max_global_concurrency.max(1));
        let continuation = ContinuationHandler::new(config.max_continuation_rounds);
        let (active, _) = watch::channel(0usize);
        Self {
            config,
            providers,
            limiter,
            extractor,
            continuation,
            admission,
            active,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Build a pool and its rate limiter from one configuration object.
    pub fn from_config(
        config: DispatchConfig,
        providers: HashMap<String, Arc<dyn Provider>>,
        extractor: Arc<dyn CodeExtractor>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.provider_budgets.clone()));
        Self::new(config, providers, limiter, extractor)
    }

    /// Execute one work item to completion.
    ///
    /// Suspends until a global slot is free, then runs the item including
    /// transient retries. Every failure is reduced to a `WorkResult`; the
    /// only error returned is [`PoolError::ShuttingDown`].
    pub async fn submit(&self, item: WorkItem) -> Result<WorkResult, PoolError> {
        if self.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        // Count the item before admission so drain also waits for queued
        // items that were already accepted.
        self.active.send_modify(|count| *count += 1);
        let _active = ActiveGuard {
            active: &self.active,
        };
        let _permit = self.admission.acquire().await;
        Ok(self.execute_with_retries(&item).await)
    }

    /// Execute a batch of work items concurrently and independently.
    ///
    /// Returns one entry per item, keyed by model name. A failure in one
    /// item never aborts its siblings; it becomes that entry's failed
    /// result.
    pub async fn submit_batch(
        &self,
        items: Vec<WorkItem>,
    ) -> Result<HashMap<String, WorkResult>, PoolError> {
        if self.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        info!(count = items.len(), "submitting work batch");

        let executions = items.into_iter().map(|item| async move {
            let model = item.model.clone();
            match self.submit(item).await {
                Ok(result) => (model, result),
                Err(PoolError::ShuttingDown) => {
                    let result = WorkResult::failure(
                        &model,
                        Duration::ZERO,
                        "work pool is shutting down",
                    );
                    (model, result)
                }
            }
        });
        Ok(join_all(executions).await.into_iter().collect())
    }

    /// Stop accepting new work and wait for in-flight items to finish.
    pub async fn drain(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!(active = self.active_count(), "draining work pool");
        let mut rx = self.active.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        info!("work pool drained");
    }

    /// Allow submissions again after a drain.
    pub fn reset(&self) {
        self.shutting_down.store(false, Ordering::SeqCst);
    }

    /// Number of accepted items not yet finished (running or queued).
    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.active_count() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn execute_with_retries(&self, item: &WorkItem) -> WorkResult {
        let started = Instant::now();
        let mut retry = 0u32;
        loop {
            let error = match self.execute_once(item, started).await {
                Ok(result) => return result,
                Err(error) => error,
            };

            let message = error.to_string();
            let class = classify_error(&message);
            if class == ErrorClass::RateLimited {
                let retry_after = match &error {
                    ProviderError::RateLimited { retry_after, .. } => *retry_after,
                    _ => None,
                };
                self.limiter
                    .update_from_error(&item.provider, retry_after, true);
            }

            if class.is_retryable() && retry < self.config.max_transient_retries {
                retry += 1;
                let delay = self.config.retry_backoff_unit.saturating_mul(retry);
                warn!(
                    item = %item.id,
                    model = %item.model,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient failure, backing off before retry"
                );
                sleep(delay).await;
                continue;
            }

            if class.is_retryable() {
                error!(item = %item.id, model = %item.model, error = %message, "transient retries exhausted");
            } else {
                error!(item = %item.id, model = %item.model, error = %message, "permanent failure");
            }
            return WorkResult::failure(&item.model, started.elapsed(), message);
        }
    }

    async fn execute_once(
        &self,
        item: &WorkItem,
        started: Instant,
    ) -> Result<WorkResult, ProviderError> {
        let Some(provider) = self.providers.get(&item.provider) else {
            // Configuration failure; retrying cannot help.
            return Ok(WorkResult::failure(
                &item.model,
                started.elapsed(),
                format!("no provider registered under '{}'", item.provider),
            ));
        };

        let prompt = if item.attempt <= 1 {
            prompt::render_generation_prompt(&item.task)
        } else {
            prompt::render_fix_prompt(&item.task, &item.history)
        };
        let request = GenerationRequest::new(item.model.clone(), prompt);
        let context = RequestContext {
            task: Some(item.task.name.clone()),
            attempt: item.attempt,
            metadata: HashMap::new(),
        };
        let estimated = item
            .estimated_tokens
            .unwrap_or_else(|| estimate_tokens(&request.prompt));

        let lease: RateLimitLease = self.limiter.acquire(&item.provider, estimated).await;
        debug!(
            item = %item.id,
            provider = %item.provider,
            model = %item.model,
            attempt = item.attempt,
            estimated_tokens = estimated,
            "dispatching work item"
        );

        let streaming_callback = item
            .on_chunk
            .as_ref()
            .filter(|_| provider.supports_streaming());
        let outcome = match streaming_callback {
            Some(callback) => {
                self.continuation
                    .run_streaming(provider.as_ref(), &request, &context, callback)
                    .await
            }
            None => {
                self.continuation
                    .run(provider.as_ref(), &request, &context)
                    .await
            }
        };

        let continuation = match outcome {
            Ok(continuation) => continuation,
            Err(error) => {
                // Dropping the lease credits the original estimate.
                drop(lease);
                return Err(error);
            }
        };
        lease.release(Some(continuation.usage.total()));

        let extraction = self.extractor.extract(&continuation.text);
        let code = self
            .extractor
            .clean(&extraction.code, continuation.language.as_deref());
        let truncation_warning = continuation.was_truncated.then(|| {
            format!(
                "output still hit the length limit after {} continuation rounds; the result may be incomplete",
                continuation.rounds
            )
        });
        let elapsed = started.elapsed();

        if code.trim().is_empty() {
            return Ok(WorkResult {
                success: false,
                model: item.model.clone(),
                code,
                response: Some(continuation.response),
                elapsed,
                ready_for_compile: false,
                continuation_rounds: continuation.rounds,
                truncation_warning,
                error: Some("model produced no extractable code".to_string()),
            });
        }
        if extraction.confidence < READY_CONFIDENCE_THRESHOLD {
            return Ok(WorkResult {
                success: false,
                model: item.model.clone(),
                code,
                response: Some(continuation.response),
                elapsed,
                ready_for_compile: false,
                continuation_rounds: continuation.rounds,
                truncation_warning,
                error: Some(format!(
                    "extraction confidence {:.2} is below the {:.2} threshold",
                    extraction.confidence, READY_CONFIDENCE_THRESHOLD
                )),
            });
        }

        debug!(
            item = %item.id,
            model = %item.model,
            rounds = continuation.rounds,
            tokens = continuation.usage.total(),
            "work item completed"
        );
        Ok(WorkResult {
            success: true,
            model: item.model.clone(),
            code,
            response: Some(continuation.response),
            elapsed,
            ready_for_compile: true,
            continuation_rounds: continuation.rounds,
            truncation_warning,
            error: None,
        })
    }
}

/// Default token estimate: prompt at ~4 chars per token plus a completion
/// allowance.
fn estimate_tokens(prompt: &str) -> u64 {
    (prompt.len() as u64).div_ceil(CHARS_PER_TOKEN) + COMPLETION_ALLOWANCE
}
