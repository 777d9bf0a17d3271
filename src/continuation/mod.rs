//! Reassembly of length-truncated responses.
//!
//! Providers cut generation off when a response hits the configured output
//! limit and report `finish_reason = Length`. The [`ContinuationHandler`]
//! drives a request to completion across such cutoffs: it re-issues the
//! request with the text produced so far and an instruction to continue
//! from the exact cutoff, appends each round's output, and sums usage, so
//! the rest of the pipeline sees one uninterrupted response.

use crate::llm::{
    ChunkCallback, FinishReason, GenerationRequest, GenerationResponse, Provider, ProviderError,
    RequestContext, StreamEvent, TokenUsage,
};
use futures::StreamExt;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;


/// Accumulated outcome of one generation driven across continuation rounds.
#[derive(Debug, Clone)]
pub struct ContinuationResult {
    /// Full accumulated text across all rounds.
    pub text: String,
    /// Language tag sniffed from the first fenced block, if any.
    pub language: Option<String>,
    /// Synthesized response, as if produced by one uninterrupted call.
    pub response: GenerationResponse,
    /// Whether fenced delimiters appear in the accumulated text.
    pub used_delimiters: bool,
    /// Number of continuation rounds issued beyond the initial call.
    pub rounds: u32,
    /// True when the final round still ended on a length cutoff.
    pub was_truncated: bool,
    /// Cumulative usage across all rounds.
    pub usage: TokenUsage,
}

/// Drives provider calls to completion across length cutoffs.
#[derive(Debug, Clone)]
pub struct ContinuationHandler {
    max_rounds: u32,
}

impl ContinuationHandler {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    /// Run a unary request to completion.
    pub async fn run(
        &self,
        provider: &dyn Provider,
        request: &GenerationRequest,
        context: &RequestContext,
    ) -> Result<ContinuationResult, ProviderError> {
        self.drive(provider, request, context, None).await
    }

    /// Run a streaming request to completion, forwarding every fragment to
    /// `on_chunk` in receipt order.
    pub async fn run_streaming(
        &self,
        provider: &dyn Provider,
        request: &GenerationRequest,
        context: &RequestContext,
        on_chunk: &ChunkCallback,
    ) -> Result<ContinuationResult, ProviderError> {
        self.drive(provider, request, context, Some(on_chunk)).await
    }

    async fn drive(
        &self,
        provider: &dyn Provider,
        request: &GenerationRequest,
        context: &RequestContext,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<ContinuationResult, ProviderError> {
        let started = Instant::now();
        let mut text = String::new();
        let mut usage = TokenUsage::default();
        let mut rounds = 0u32;
        let mut current = request.clone();

        let finish_reason = loop {
            let (content, round_usage, finish) = match on_chunk {
                None => {
                    let response = provider.generate(current.clone(), context.clone()).await?;
                    (response.content, response.usage, response.finish_reason)
                }
                Some(callback) => {
                    self.stream_round(provider, &current, context, callback)
                        .await?
                }
            };

            text.push_str(&content);
            usage.add(&round_usage);

            if finish != FinishReason::Length {
                break finish;
            }
            if rounds >= self.max_rounds {
                warn!(
                    model = %request.model,
                    rounds,
                    "output still truncated after the continuation round cap"
                );
                break finish;
            }
            rounds += 1;
            debug!(model = %request.model, round = rounds, "output cut off, continuing");
            current = continuation_request(request, &text);
        };

        let (language, used_delimiters) = sniff_fence(&text);
        let response = GenerationResponse {
            content: text.clone(),
            usage,
            finish_reason,
            duration: started.elapsed(),
        };

        Ok(ContinuationResult {
            text,
            language,
            response,
            used_delimiters,
            rounds,
            was_truncated: finish_reason == FinishReason::Length,
            usage,
        })
    }

    /// One streaming round: forward deltas, return the terminal event.
    async fn stream_round(
        &self,
        provider: &dyn Provider,
        request: &GenerationRequest,
        context: &RequestContext,
        on_chunk: &ChunkCallback,
    ) -> Result<(String, TokenUsage, FinishReason), ProviderError> {
        let mut stream = provider
            .generate_stream(request.clone(), context.clone())
            .await?;
        let mut content = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Delta(fragment) => {
                    on_chunk(&fragment);
                    content.push_str(&fragment);
                }
                StreamEvent::Done {
                    usage,
                    finish_reason,
                } => {
                    return Ok((content, usage, finish_reason));
                }
            }
        }

        Err(ProviderError::Other(
            "response stream ended without a terminal event".to_string(),
        ))
    }
}

/// Build the follow-up request for one more round.
fn continuation_request(original: &GenerationRequest, so_far: &str) -> GenerationRequest {
    let mut prompt = String::with_capacity(original.prompt.len() + so_far.len() + 512);
    prompt.push_str(&original.prompt);
    prompt.push_str("\n\n---\n");
    prompt.push_str(
        "Your previous reply to the request above was cut off by the output \
         length limit. Everything you have produced so far is:\n\n",
    );
    prompt.push_str(so_far);
    prompt.push_str(
        "\n\nContinue exactly from where the output stops. Do not repeat any \
         earlier text, do not restart the code block, and do not add any \
         introduction.",
    );

    GenerationRequest {
        id: Uuid::new_v4(),
        model: original.model.clone(),
        prompt,
        system_message: original.system_message.clone(),
        max_tokens: original.max_tokens,
        temperature: original.temperature,
    }
}

/// Find the first opening code fence; return its language tag and whether a
/// fence exists at all.
fn sniff_fence(text: &str) -> (Option<String>, bool) {
    match text.find("```") {
        None => (None, false),
        Some(idx) => {
            let rest = &text[idx + 3..];
            let tag: String = rest
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '#' | '.' | '-'))
                .collect();
            let language = if tag.is_empty() { None } else { Some(tag) };
            (language, true)
        }
    }
}
