//! # Genbench Dispatch Core
//!
//! The concurrency core of a benchmarking harness that evaluates
//! model-generated code. It dispatches many independent generation requests
//! (one per task/model/attempt) to external text-generation providers while
//! respecting per-provider capacity limits, tolerating transient failures,
//! and reassembling responses that providers truncate mid-stream.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                    WorkPool                       │
//! │  admission ▸ lease ▸ continuation ▸ extraction    │
//! └──────┬─────────────┬──────────────┬───────────────┘
//!        │             │              │
//!   ┌────▼────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!   │  sync   │  │  limiter  │  │    llm    │
//!   │ (FIFO)  │  │ (budgets) │  │ (Provider)│
//!   └─────────┘  └───────────┘  └───────────┘
//! ```
//!
//! ## Key Features
//!
//! ### Rate Limiting
//! - Three independent budgets per provider: in-flight requests, requests
//!   per interval, tokens per interval
//! - Leases reconcile estimated against actual token cost on release
//! - Penalty windows when a provider itself reports rate limiting
//!
//! ### Work Dispatch
//! - Global concurrency ceiling enforced by a FIFO semaphore, no polling
//! - Transient failures retried in place with linear backoff
//! - Batch fan-out with failures isolated per item
//! - Graceful drain: stop admissions, wait for in-flight work
//!
//! ### Continuation
//! - Length-truncated responses are re-requested from the exact cutoff and
//!   reassembled into one uninterrupted response
//! - Streaming dispatch forwards every fragment in receipt order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genbench::{DispatchConfig, FencedExtractor, TaskManifest, WorkItem, WorkPool};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let providers = HashMap::new(); // register Provider impls per backend
//!     let pool = WorkPool::from_config(
//!         DispatchConfig::default(),
//!         providers,
//!         Arc::new(FencedExtractor::new()),
//!     );
//!
//!     let task = Arc::new(TaskManifest {
//!         name: "reverse-list".to_string(),
//!         description: "Reverse a singly linked list in place.".to_string(),
//!     });
//!     let result = pool
//!         .submit(WorkItem::new(task, "openai", "gpt-4o"))
//!         .await?;
//!     println!("ready for compile: {}", result.ready_for_compile);
//!     Ok(())
//! }
//! ```

/// Bounded-concurrency primitives: FIFO mutex and counting semaphore.
pub mod sync;

/// Per-provider rate limiting with leases and penalty windows.
pub mod limiter;

/// Provider-agnostic generation interface.
///
/// The [`llm::Provider`] trait is the only seam between this core and the
/// backend-specific clients living outside the crate.
pub mod llm;

/// Code extraction capability and the stock fenced-block extractor.
pub mod extract;

/// Reassembly of length-truncated responses.
pub mod continuation;

/// Work pool: admission, retries, batching, graceful drain.
pub mod pool;

/// Configuration object with TOML round-tripping.
pub mod config;

// Re-export the main surface types
pub use config::DispatchConfig;
pub use continuation::{ContinuationHandler, ContinuationResult};
pub use extract::{CodeExtractor, Extraction, FencedExtractor};
pub use limiter::{LimiterStatus, ProviderLimits, RateLimitLease, RateLimiter};
pub use llm::{
    ChunkCallback, FinishReason, GenerationRequest, GenerationResponse, GenerationStream,
    Provider, ProviderError, RequestContext, StreamEvent, TokenUsage,
};
pub use pool::{
    ExecutionAttempt, PoolError, TaskManifest, WorkItem, WorkPool, WorkPriority, WorkResult,
};
pub use sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};
