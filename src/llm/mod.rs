//! Provider-agnostic generation interface.
//!
//! The dispatch core talks to every text-generation backend through the
//! single [`Provider`] trait; backend-specific SDK objects and wire formats
//! are adapted to [`GenerationRequest`]/[`GenerationResponse`] before they
//! reach the pool or the continuation handler.

pub mod provider;
pub mod types;

pub use provider::Provider;
pub use types::{
    ChunkCallback, FinishReason, GenerationRequest, GenerationResponse, GenerationStream,
    ProviderError, RequestContext, StreamEvent, TokenUsage,
};
