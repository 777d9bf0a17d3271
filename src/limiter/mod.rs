//! Per-provider rate limiting.
//!
//! Each provider name carries three independent budgets: simultaneous
//! in-flight requests, requests per interval, and estimated tokens per
//! interval. [`RateLimiter::acquire`] suspends until all three have
//! headroom, then issues a [`RateLimitLease`]; releasing the lease with the
//! actual token cost reconciles the token counter with reality. When a
//! provider itself reports rate limiting, [`RateLimiter::update_from_error`]
//! opens a penalty window that new acquisitions additionally wait out.
//!
//! Waiters for the same provider queue FIFO on a per-provider
//! [`sync::Mutex`] gate; the head waiter re-checks capacity on every lease
//! release or at the next point a window or penalty can free headroom.
//!
//! [`sync::Mutex`]: crate::sync::Mutex

pub mod types;

pub use types::{LimiterStatus, ProviderLimits};

use crate::sync;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};
use types::ProviderBudget;
use uuid::Uuid;


/// Upper bound on the exponential default penalty.
const MAX_DEFAULT_PENALTY: Duration = Duration::from_secs(300);

/// Fallback re-check period when only a lease release can free capacity.
const CONCURRENCY_WAIT: Duration = Duration::from_secs(5);

/// Tracks budgets for every provider and issues capacity leases.
pub struct RateLimiter {
    shared: Arc<LimiterShared>,
}

struct LimiterShared {
    limits: HashMap<String, ProviderLimits>,
    budgets: DashMap<String, ProviderBudget>,
    gates: DashMap<String, sync::Mutex>,
    released: Notify,
}

/// A reservation of rate-limit capacity for one request.
///
/// Exactly one release follows every acquire: either explicitly through
/// [`release`](RateLimitLease::release) with the observed token cost, or
/// implicitly on drop, which credits the original estimate. Either way the
/// provider's in-flight count is restored, so an error path that merely
/// drops the lease cannot leak capacity.
pub struct RateLimitLease {
    shared: Arc<LimiterShared>,
    provider: String,
    estimated_tokens: u64,
    id: Uuid,
    released: bool,
}

enum Admission {
    Granted,
    Blocked { retry_at: Option<Instant> },
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, ProviderLimits>) -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                limits,
                budgets: DashMap::new(),
                gates: DashMap::new(),
                released: Notify::new(),
            }),
        }
    }

    /// Acquire capacity for one request against `provider`, suspending
    /// until every budget has headroom and any penalty window has elapsed.
    pub async fn acquire(&self, provider: &str, estimated_tokens: u64) -> RateLimitLease {
        // Serialize acquirers per provider so they are admitted in arrival
        // order rather than racing on every wakeup.
        let gate = {
            let entry = self.shared.gates.entry(provider.to_string()).or_default();
            entry.value().clone()
        };
        let _gate = gate.acquire().await;

        loop {
            let verdict = self.shared.try_admit(provider, estimated_tokens);
            let retry_at = match verdict {
                Admission::Granted => {
                    debug!(provider, estimated_tokens, "rate limit lease granted");
                    return RateLimitLease {
                        shared: self.shared.clone(),
                        provider: provider.to_string(),
                        estimated_tokens,
                        id: Uuid::new_v4(),
                        released: false,
                    };
                }
                Admission::Blocked { retry_at } => retry_at,
            };

            let sleep_for = retry_at
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(CONCURRENCY_WAIT)
                .max(Duration::from_millis(1));
            tokio::select! {
                _ = self.shared.released.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Feed a provider-reported error back into the budget.
    ///
    /// Only rate-limit errors have an effect: they open a penalty window of
    /// `retry_after`, or an exponential default when the provider did not
    /// say how long to back off.
    pub fn update_from_error(
        &self,
        provider: &str,
        retry_after: Option<Duration>,
        is_rate_limited: bool,
    ) {
        if !is_rate_limited {
            return;
        }
        let now = Instant::now();
        let mut budget = self
            .shared
            .budgets
            .entry(provider.to_string())
            .or_insert_with(|| ProviderBudget::new(now));
        let penalty = retry_after.unwrap_or_else(|| {
            default_penalty(budget.consecutive_rate_limits)
        });
        budget.penalized_until = Some(now + penalty);
        budget.consecutive_rate_limits += 1;
        warn!(
            provider,
            penalty_ms = penalty.as_millis() as u64,
            strikes = budget.consecutive_rate_limits,
            "provider reported rate limiting, penalizing budget"
        );
    }

    /// Snapshot one provider's counters.
    pub fn status(&self, provider: &str) -> LimiterStatus {
        let now = Instant::now();
        match self.shared.budgets.get(provider) {
            Some(budget) => LimiterStatus {
                in_flight: budget.in_flight,
                window_requests: budget.window_requests,
                window_tokens: budget.window_tokens,
                penalized_for: budget
                    .penalized_until
                    .and_then(|until| until.checked_duration_since(now)),
            },
            None => LimiterStatus {
                in_flight: 0,
                window_requests: 0,
                window_tokens: 0,
                penalized_for: None,
            },
        }
    }

    /// Configured limits for a provider (the unbounded default if absent).
    pub fn limits(&self, provider: &str) -> ProviderLimits {
        self.shared.limits_for(provider)
    }
}

impl LimiterShared {
    fn limits_for(&self, provider: &str) -> ProviderLimits {
        self.limits
            .get(provider)
            .cloned()
            .unwrap_or_else(ProviderLimits::unbounded)
    }

    fn try_admit(&self, provider: &str, estimated_tokens: u64) -> Admission {
        let limits = self.limits_for(provider);
        let now = Instant::now();
        let mut budget = self
            .budgets
            .entry(provider.to_string())
            .or_insert_with(|| ProviderBudget::new(now));
        budget.roll_window(now, limits.interval);

        if let Some(until) = budget.penalized_until {
            if now < until {
                return Admission::Blocked {
                    retry_at: Some(until),
                };
            }
            budget.penalized_until = None;
            budget.consecutive_rate_limits = 0;
        }

        if let Some(cap) = limits.max_concurrent {
            if budget.in_flight >= cap {
                // Only a release frees this; no timed bound to wait for.
                return Admission::Blocked { retry_at: None };
            }
        }

        let window_resets = budget.window_started + limits.interval;
        if let Some(cap) = limits.requests_per_interval {
            if budget.window_requests >= cap {
                return Admission::Blocked {
                    retry_at: Some(window_resets),
                };
            }
        }
        if let Some(cap) = limits.tokens_per_interval {
            // An estimate larger than the whole budget is admitted into an
            // otherwise-empty window; it could never run under the strict
            // check.
            let oversized = estimated_tokens > cap && budget.window_tokens == 0;
            if budget.window_tokens + estimated_tokens > cap && !oversized {
                return Admission::Blocked {
                    retry_at: Some(window_resets),
                };
            }
        }

        budget.in_flight += 1;
        budget.window_requests += 1;
        budget.window_tokens += estimated_tokens;
        Admission::Granted
    }

    fn release(&self, provider: &str, estimated_tokens: u64, actual_tokens: Option<u64>) {
        if let Some(mut budget) = self.budgets.get_mut(provider) {
            budget.in_flight = budget.in_flight.saturating_sub(1);
            let actual = actual_tokens.unwrap_or(estimated_tokens);
            if actual < estimated_tokens {
                budget.window_tokens = budget
                    .window_tokens
                    .saturating_sub(estimated_tokens - actual);
            } else {
                budget.window_tokens = budget
                    .window_tokens
                    .saturating_add(actual - estimated_tokens);
            }
        }
        self.released.notify_waiters();
    }
}

impl RateLimitLease {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.estimated_tokens
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Release the reservation, reconciling the token budget with the
    /// actual cost when known.
    pub fn release(mut self, actual_tokens: Option<u64>) {
        self.finish(actual_tokens);
    }

    fn finish(&mut self, actual_tokens: Option<u64>) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared
            .release(&self.provider, self.estimated_tokens, actual_tokens);
    }
}

impl Drop for RateLimitLease {
    fn drop(&mut self) {
        self.finish(None);
    }
}

impl std::fmt::Debug for RateLimitLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitLease")
            .field("provider", &self.provider)
            .field("estimated_tokens", &self.estimated_tokens)
            .field("id", &self.id)
            .finish()
    }
}

/// Exponential default penalty with jitter, for providers that report rate
/// limiting without a retry-after.
fn default_penalty(strikes: u32) -> Duration {
    let base = Duration::from_secs(1);
    let scaled = base.as_millis() as u64 * 2u64.pow(strikes.min(8));
    // +/- 10% jitter so penalized callers do not return in lockstep.
    let jitter = (rand::random::<f64>() - 0.5) * 0.2;
    let jittered = (scaled as f64 * (1.0 + jitter)) as u64;
    Duration::from_millis(jittered).min(MAX_DEFAULT_PENALTY)
}
