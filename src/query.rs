use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    error::HostingError,
    github::{Hosting, classify_failure_message},
    graphql::{GraphQLError, GraphQLResponse, RATE_LIMIT_QUERY, RateLimitData},
    types::RateLimit,
};

/// Exponential backoff for transient hosting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): base, 2×base, 4×base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// When to stop and wait for the quota to refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub threshold: u32,
    pub reset_buffer: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            threshold: 500,
            reset_buffer: Duration::from_secs(5),
        }
    }
}

/// How long to pause given a quota snapshot, measured from `now`.
pub fn rate_limit_pause(
    snapshot: &RateLimit,
    policy: &RateLimitPolicy,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if snapshot.remaining >= policy.threshold {
        return None;
    }
    let until_reset = (snapshot.reset_at - now).to_std().unwrap_or(Duration::ZERO);
    Some(until_reset + policy.reset_buffer)
}

/// Runs GraphQL documents against a [`Hosting`] transport with retry and
/// quota handling.
#[derive(Debug)]
pub struct QueryExecutor<H> {
    hosting: H,
    retry: RetryPolicy,
    rate_limit: RateLimitPolicy,
}

impl<H: Hosting + Sync> QueryExecutor<H> {
    pub fn new(hosting: H) -> Self {
        Self::with_policies(hosting, RetryPolicy::default(), RateLimitPolicy::default())
    }

    pub fn with_policies(hosting: H, retry: RetryPolicy, rate_limit: RateLimitPolicy) -> Self {
        Self {
            hosting,
            retry,
            rate_limit,
        }
    }

    pub fn hosting(&self) -> &H {
        &self.hosting
    }

    /// Executes one query, retrying transient failures with exponential
    /// backoff. Every other error is returned on first sight.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, HostingError> {
        let payload = json!({ "query": query, "variables": variables });
        let mut attempt = 1;

        loop {
            match self.execute_once(&payload).await {
                Err(err) if err.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(attempts = attempt, error = %err, "Giving up on GitHub query");
                        return Err(HostingError::ServiceUnavailable { attempts: attempt });
                    }
                    let delay = self.retry.delay_after(attempt);
                    warn!(attempt, ?delay, error = %err, "Transient GitHub failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn execute_once<T: DeserializeOwned>(&self, payload: &Value) -> Result<T, HostingError> {
        let body = self.hosting.graphql(payload).await?;

        // A bare JSON string is an upstream error message. Non-JSON error
        // pages never get here: octocrab fails to decode them and they are
        // classified in `github::classify_octocrab_error`.
        if let Value::String(text) = &body {
            return Err(classify_failure_message(text));
        }

        let response: GraphQLResponse<T> = serde_json::from_value(body)?;
        if let Some(error) = response.errors.first() {
            debug!(errors = response.errors.len(), kind = ?error.kind, "GraphQL errors in response");
            return Err(classify_graphql_error(error));
        }
        response
            .data
            .ok_or_else(|| HostingError::Query("response contained no data".to_string()))
    }

    /// Reads the current quota and waits if it is already low. Called before
    /// each multi-page walk.
    pub async fn ensure_quota(&self) -> Result<RateLimit, HostingError> {
        let data: RateLimitData = self.execute(RATE_LIMIT_QUERY, json!({})).await?;
        self.throttle(&data.rate_limit).await;
        Ok(data.rate_limit)
    }

    /// Sleeps until the quota resets when it has dropped below the threshold.
    /// The wait is computed from the wall clock at the time of the call.
    pub async fn throttle(&self, snapshot: &RateLimit) {
        let now = Utc::now();
        if let Some(pause) = rate_limit_pause(snapshot, &self.rate_limit, now) {
            let resume_at = now
                + chrono::Duration::from_std(pause).unwrap_or_else(|_| chrono::Duration::zero());
            warn!(
                remaining = snapshot.remaining,
                threshold = self.rate_limit.threshold,
                "GitHub rate limit low; resuming {}",
                HumanTime::from(resume_at)
            );
            tokio::time::sleep(pause).await;
        }
    }
}

const MISSING_ORGANIZATION_PREFIX: &str = "could not resolve to an organization";

/// `NOT_FOUND` is split on GitHub's fixed message prefix; the quoted login
/// that follows it may contain any word.
fn classify_graphql_error(error: &GraphQLError) -> HostingError {
    if error.kind.as_deref() == Some("NOT_FOUND") {
        if error
            .message
            .to_lowercase()
            .starts_with(MISSING_ORGANIZATION_PREFIX)
        {
            return HostingError::OrganizationNotFound(error.message.clone());
        }
        return HostingError::NotResolved(error.message.clone());
    }
    classify_failure_message(&error.message)
}
