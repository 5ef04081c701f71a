use std::time::Duration;

use crate::{
    error::ConfigError,
    github::get_github_token,
    llm::DEFAULT_ANTHROPIC_BASE_URL,
    query::{RateLimitPolicy, RetryPolicy},
};

pub const DEFAULT_ANALYSIS_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_PROMPT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;

/// Environment-derived settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub analysis_model: String,
    pub prompt_model: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitPolicy,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable source. Unparseable numbers
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|s| s.trim().parse::<u64>().ok());

        let retry_defaults = RetryPolicy::default();
        let rate_defaults = RateLimitPolicy::default();

        Self {
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY").map(|k| k.trim().to_string()),
            anthropic_base_url: non_empty("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            analysis_model: non_empty("REVIEW_MINER_ANALYSIS_MODEL")
                .unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            prompt_model: non_empty("REVIEW_MINER_PROMPT_MODEL")
                .unwrap_or_else(|| DEFAULT_PROMPT_MODEL.to_string()),
            http_timeout: Duration::from_secs(
                parsed("REVIEW_MINER_HTTP_TIMEOUT_SECS").unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            retry: RetryPolicy {
                max_attempts: parsed("REVIEW_MINER_MAX_RETRIES")
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(retry_defaults.max_attempts),
                base_delay: parsed("REVIEW_MINER_RETRY_BASE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(retry_defaults.base_delay),
            },
            rate_limit: RateLimitPolicy {
                threshold: parsed("REVIEW_MINER_RATE_LIMIT_THRESHOLD")
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(rate_defaults.threshold),
                ..rate_defaults
            },
        }
    }

    pub fn llm_api_key(&self) -> Result<&str, ConfigError> {
        self.anthropic_api_key
            .as_deref()
            .ok_or(ConfigError::MissingLlmKey)
    }

    pub fn github_token() -> Result<String, ConfigError> {
        get_github_token(|key| std::env::var(key).ok())
    }
}
