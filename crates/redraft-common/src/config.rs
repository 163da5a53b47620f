use serde::Deserialize;
use std::time::Duration;

use crate::types::Provider;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_transform_url")]
    pub transform_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub provider: Provider,
    /// Largest estimated token count sent to a provider in one call.
    #[serde(default = "default_single_call_budget")]
    pub single_call_budget: usize,
    /// Per-chunk budget once a document is split. Kept well under
    /// `single_call_budget` to leave room for instructions and output.
    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default = "default_max_resplit_depth")]
    pub max_resplit_depth: usize,
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: usize,
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_transform_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_single_call_budget() -> usize {
    16_000
}

fn default_chunk_budget() -> usize {
    4_000
}

fn default_max_resplit_depth() -> usize {
    6
}

fn default_rate_limit_retries() -> usize {
    2
}

fn default_rate_limit_backoff_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transform_url: default_transform_url(),
            api_key: None,
            provider: Provider::default(),
            single_call_budget: default_single_call_budget(),
            chunk_budget: default_chunk_budget(),
            cooldown_ms: 0,
            max_resplit_depth: default_max_resplit_depth(),
            rate_limit_retries: default_rate_limit_retries(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load from `REDRAFT_*` environment variables (`__` separates nested keys).
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("REDRAFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_headroom_between_budgets() {
        let config = AppConfig::default();
        assert!(config.chunk_budget < config.single_call_budget);
        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.cooldown(), Duration::ZERO);
    }

    #[test]
    fn empty_source_deserializes_to_defaults() {
        let config: AppConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.single_call_budget, 16_000);
        assert_eq!(config.transform_url, "http://localhost:8090");
        assert!(config.api_key.is_none());
    }
}
