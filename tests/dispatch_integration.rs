//! End-to-end dispatch through the public surface: pool, limiter,
//! continuation, and extraction working together against mock providers.

use async_trait::async_trait;
use genbench::{
    DispatchConfig, FencedExtractor, FinishReason, GenerationRequest, GenerationResponse,
    Provider, ProviderError, ProviderLimits, RateLimiter, RequestContext, TaskManifest,
    TokenUsage, WorkItem, WorkPool,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Provider that truncates its reply once, then completes it.
struct TwoPartProvider {
    calls: AtomicU32,
}

#[async_trait]
impl Provider for TwoPartProvider {
    fn name(&self) -> &str {
        "two-part"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
        _context: RequestContext,
    ) -> Result<GenerationResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let (content, finish_reason) = if call == 0 {
            ("```rust\nfn solve() -> i32 {\n".to_string(), FinishReason::Length)
        } else {
            ("    42\n}\n```\n".to_string(), FinishReason::Stop)
        };
        Ok(GenerationResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 15,
                completion_tokens: 8,
            },
            finish_reason,
            duration: Duration::from_millis(2),
        })
    }
}

fn task(name: &str) -> Arc<TaskManifest> {
    Arc::new(TaskManifest {
        name: name.to_string(),
        description: "Return the answer as a function.".to_string(),
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genbench=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn truncated_generation_is_reassembled_end_to_end() {
    init_tracing();
    let provider = Arc::new(TwoPartProvider {
        calls: AtomicU32::new(0),
    });
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    providers.insert("two-part".to_string(), provider.clone());

    let config = DispatchConfig::default()
        .with_provider_budget("two-part", ProviderLimits::per_minute(4, 100, 1_000_000));
    let limiter = Arc::new(RateLimiter::new(config.provider_budgets.clone()));
    let pool = WorkPool::new(
        config,
        providers,
        limiter.clone(),
        Arc::new(FencedExtractor::new()),
    );

    let result = pool
        .submit(WorkItem::new(task("answer"), "two-part", "mock-model"))
        .await
        .expect("pool should not be shutting down");

    assert!(result.success);
    assert!(result.ready_for_compile);
    assert_eq!(result.continuation_rounds, 1);
    assert!(result.truncation_warning.is_none());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    // The synthesized response looks like one uninterrupted call.
    let response = result.response.expect("successful result carries a response");
    assert!(response.content.contains("fn solve"));
    assert!(response.content.contains("42"));
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.prompt_tokens, 30);
    assert_eq!(response.usage.completion_tokens, 16);

    // The extracted code is the joined fenced block.
    assert!(result.code.contains("fn solve() -> i32 {"));
    assert!(result.code.contains("    42"));
    assert!(!result.code.contains("```"));

    // All capacity was returned.
    assert_eq!(limiter.status("two-part").in_flight, 0);
}

#[tokio::test]
async fn batch_across_providers_is_keyed_by_model() {
    init_tracing();
    struct EchoProvider {
        name: String,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            request: GenerationRequest,
            _context: RequestContext,
        ) -> Result<GenerationResponse, ProviderError> {
            Ok(GenerationResponse {
                content: format!("```rust\n// {}\nfn solve() {{}}\n```\n", request.model),
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                },
                finish_reason: FinishReason::Stop,
                duration: Duration::from_millis(1),
            })
        }
    }

    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    for name in ["alpha", "beta"] {
        providers.insert(
            name.to_string(),
            Arc::new(EchoProvider {
                name: name.to_string(),
            }),
        );
    }
    let pool = WorkPool::from_config(
        DispatchConfig::default(),
        providers,
        Arc::new(FencedExtractor::new()),
    );

    let items = vec![
        WorkItem::new(task("t"), "alpha", "alpha-small"),
        WorkItem::new(task("t"), "alpha", "alpha-large"),
        WorkItem::new(task("t"), "beta", "beta-small"),
    ];
    let results = pool.submit_batch(items).await.unwrap();

    assert_eq!(results.len(), 3);
    for model in ["alpha-small", "alpha-large", "beta-small"] {
        let result = &results[model];
        assert!(result.success, "{model} should succeed");
        assert!(result.code.contains(model));
    }
}

#[tokio::test]
async fn fix_attempts_render_prior_failures_into_the_prompt() {
    struct PromptCapture {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Provider for PromptCapture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn generate(
            &self,
            request: GenerationRequest,
            _context: RequestContext,
        ) -> Result<GenerationResponse, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(GenerationResponse {
                content: "```rust\nfn solve() {}\n```\n".to_string(),
                usage: TokenUsage::default(),
                finish_reason: FinishReason::Stop,
                duration: Duration::from_millis(1),
            })
        }
    }

    let provider = Arc::new(PromptCapture {
        prompts: std::sync::Mutex::new(Vec::new()),
    });
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    providers.insert("capture".to_string(), provider.clone());
    let pool = WorkPool::from_config(
        DispatchConfig::default(),
        providers,
        Arc::new(FencedExtractor::new()),
    );

    let history = vec![genbench::ExecutionAttempt {
        extracted_code: "fn solve() { panic!() }".to_string(),
        failure_reasons: vec!["test_answer panicked".to_string()],
    }];
    let item = WorkItem::new(task("answer"), "capture", "mock-model").with_attempt(2, history);
    let result = pool.submit(item).await.unwrap();
    assert!(result.success);

    let prompts = provider.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("fn solve() { panic!() }"));
    assert!(prompts[0].contains("test_answer panicked"));
}
