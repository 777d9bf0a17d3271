use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Configured capacity for one provider.
///
/// `None` on any field means that budget is unbounded. Unknown providers
/// fall back to [`ProviderLimits::unbounded`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLimits {
    /// Maximum simultaneous in-flight requests.
    pub max_concurrent: Option<u32>,
    /// Maximum requests admitted per interval.
    pub requests_per_interval: Option<u32>,
    /// Maximum estimated tokens admitted per interval.
    pub tokens_per_interval: Option<u64>,
    /// Length of the budget interval.
    pub interval: Duration,
}

impl ProviderLimits {
    pub fn unbounded() -> Self {
        Self {
            max_concurrent: None,
            requests_per_interval: None,
            tokens_per_interval: None,
            interval: Duration::from_secs(60),
        }
    }

    /// Conventional per-minute budget.
    pub fn per_minute(
        max_concurrent: u32,
        requests_per_minute: u32,
        tokens_per_minute: u64,
    ) -> Self {
        Self {
            max_concurrent: Some(max_concurrent),
            requests_per_interval: Some(requests_per_minute),
            tokens_per_interval: Some(tokens_per_minute),
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Per-provider budget counters. Created lazily on first use and mutated
/// only through acquire/release/update_from_error.
#[derive(Debug)]
pub(crate) struct ProviderBudget {
    pub in_flight: u32,
    pub window_requests: u32,
    pub window_tokens: u64,
    pub window_started: Instant,
    pub penalized_until: Option<Instant>,
    /// Consecutive provider-reported rate limits; drives the exponential
    /// default penalty when no retry-after is supplied.
    pub consecutive_rate_limits: u32,
}

impl ProviderBudget {
    pub fn new(now: Instant) -> Self {
        Self {
            in_flight: 0,
            window_requests: 0,
            window_tokens: 0,
            window_started: now,
            penalized_until: None,
            consecutive_rate_limits: 0,
        }
    }

    /// Reset interval counters once the window has elapsed.
    pub fn roll_window(&mut self, now: Instant, interval: Duration) {
        if now.duration_since(self.window_started) >= interval {
            self.window_requests = 0;
            self.window_tokens = 0;
            self.window_started = now;
        }
    }
}

/// Snapshot of one provider's budget, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct LimiterStatus {
    pub in_flight: u32,
    pub window_requests: u32,
    pub window_tokens: u64,
    /// Remaining penalty, if the provider is currently penalized.
    pub penalized_for: Option<Duration>,
}
