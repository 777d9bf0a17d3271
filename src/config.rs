//! Dispatch core configuration.
//!
//! One plain object configures the whole core: the global concurrency
//! ceiling, per-provider budgets, and the continuation/retry limits. It
//! round-trips through TOML so a harness can keep it next to its task
//! definitions.

use crate::limiter::ProviderLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Ceiling on simultaneously executing work items across all providers.
    pub max_global_concurrency: usize,
    /// Per-provider budgets; providers absent from the map are unbounded.
    pub provider_budgets: HashMap<String, ProviderLimits>,
    /// Maximum follow-up rounds when output is cut off by a length limit.
    pub max_continuation_rounds: u32,
    /// Maximum in-place retries for transient failures.
    pub max_transient_retries: u32,
    /// Backoff grows linearly: `retry_backoff_unit * retry_index`.
    pub retry_backoff_unit: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_global_concurrency: 8,
            provider_budgets: HashMap::new(),
            max_continuation_rounds: 3,
            max_transient_retries: 7,
            retry_backoff_unit: Duration::from_secs(1),
        }
    }
}

impl DispatchConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse dispatch configuration")
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize dispatch configuration")
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// Register a provider budget, builder style.
    pub fn with_provider_budget(
        mut self,
        provider: impl Into<String>,
        limits: ProviderLimits,
    ) -> Self {
        self.provider_budgets.insert(provider.into(), limits);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sane() {
        let config = DispatchConfig::default();
        assert!(config.max_global_concurrency > 0);
        assert_eq!(config.max_transient_retries, 7);
        assert_eq!(config.retry_backoff_unit, Duration::from_secs(1));
    }

    #[test]
    fn toml_roundtrip_preserves_budgets() {
        let config = DispatchConfig::default()
            .with_provider_budget("openai", ProviderLimits::per_minute(4, 60, 90_000))
            .with_provider_budget("local", ProviderLimits::unbounded());

        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("max_global_concurrency"));
        assert!(toml_str.contains("openai"));

        let parsed = DispatchConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.max_global_concurrency, config.max_global_concurrency);
        assert_eq!(
            parsed.provider_budgets["openai"].requests_per_interval,
            Some(60)
        );
        assert_eq!(parsed.provider_budgets["local"].tokens_per_interval, None);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(DispatchConfig::from_toml_str("not toml [[[").is_err());
    }
}
