use crate::llm::types::{
    GenerationRequest, GenerationResponse, GenerationStream, ProviderError, RequestContext,
};
use async_trait::async_trait;

/// Capability exposed by every text-generation backend.
///
/// Implementations exist per backend (hosted APIs, local models) and live
/// outside this crate; the dispatch core depends only on this contract.
/// Request cancellation, where a backend supports it, is surfaced by the
/// implementation dropping the in-flight future.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, used as the rate-limiter budget key.
    fn name(&self) -> &str;

    /// Whether [`generate_stream`](Self::generate_stream) is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Execute a single generation request to completion.
    async fn generate(
        &self,
        request: GenerationRequest,
        context: RequestContext,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Execute a request as a stream of incremental fragments.
    ///
    /// The stream must yield a terminal [`StreamEvent::Done`] carrying the
    /// finish reason and usage once generation ends.
    ///
    /// [`StreamEvent::Done`]: crate::llm::types::StreamEvent::Done
    async fn generate_stream(
        &self,
        request: GenerationRequest,
        context: RequestContext,
    ) -> Result<GenerationStream, ProviderError> {
        let _ = (request, context);
        Err(ProviderError::StreamingUnsupported(self.name().to_string()))
    }
}
