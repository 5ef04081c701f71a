use std::process::Command;

use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, HostingError};

/// Narrow seam over the hosting API: post one GraphQL document, get the raw
/// response body back. Retries, pagination and decoding live above this.
#[async_trait]
pub trait Hosting {
    async fn graphql(&self, payload: &Value) -> Result<Value, HostingError>;
}

/// Looks up a GitHub token through `lookup` (normally the process
/// environment), falling back to `gh auth token`.
pub fn get_github_token<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Prefer environment variables over gh CLI to avoid subprocess overhead.
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Some(token) = lookup(var)
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .map_err(|_| ConfigError::MissingGitHubToken)?;

    if !output.status.success() {
        return Err(ConfigError::MissingGitHubToken);
    }

    let token = String::from_utf8(output.stdout)
        .map_err(|_| ConfigError::MissingGitHubToken)?
        .trim()
        .to_string();

    if token.is_empty() {
        return Err(ConfigError::MissingGitHubToken);
    }

    Ok(token)
}

/// GraphQL transport backed by octocrab.
#[derive(Debug, Clone)]
pub struct GitHub {
    octocrab: Octocrab,
}

impl GitHub {
    pub fn new(octocrab: Octocrab) -> Self {
        Self { octocrab }
    }

    /// Creates an authenticated client; `base_uri` overrides api.github.com.
    pub fn connect(token: &str, base_uri: Option<&str>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(uri) = base_uri {
            builder = builder
                .base_uri(uri)
                .with_context(|| format!("Invalid GitHub API base URI: '{uri}'"))?;
        }
        let octocrab = builder.build().context("Failed to create GitHub client")?;
        Ok(Self::new(octocrab))
    }
}

#[async_trait]
impl Hosting for GitHub {
    async fn graphql(&self, payload: &Value) -> Result<Value, HostingError> {
        match self.octocrab.graphql::<Value>(payload).await {
            Ok(body) => Ok(body),
            Err(err) => {
                debug!(error = %err, "GraphQL transport error");
                Err(classify_octocrab_error(&err))
            }
        }
    }
}

fn classify_octocrab_error(err: &octocrab::Error) -> HostingError {
    if let octocrab::Error::GitHub { source, .. } = err {
        let status = source.status_code.as_u16();
        let message = source.message.clone();
        return match status {
            401 => HostingError::Unauthorized(message),
            500..=599 => HostingError::Transient(format!("HTTP {status}: {message}")),
            _ => classify_failure_message(&message),
        };
    }
    classify_failure_message(&err.to_string())
}

const TRANSIENT_MARKERS: &[&str] = &[
    "<!doctype html",
    "<html",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "timeout",
    "timed out",
    "connection reset",
    "expected value at line 1 column 1",
];

/// Buckets a raw failure message using the same heuristics GitHub's edge
/// failures require: HTML error pages and timeouts are transient.
pub fn classify_failure_message(message: &str) -> HostingError {
    let lowered = message.to_lowercase();

    if TRANSIENT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return HostingError::Transient(truncate(message, 200));
    }
    if lowered.contains("could not resolve to a repository") {
        return HostingError::NotResolved(message.to_string());
    }
    if lowered.contains("bad credentials") || lowered.contains("401") {
        return HostingError::Unauthorized(message.to_string());
    }
    HostingError::Query(message.to_string())
}

fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let head: String = message.chars().take(max_chars).collect();
    format!("{head}...")
}
