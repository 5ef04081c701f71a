use thiserror::Error;

/// Failures talking to the hosting GraphQL API.
#[derive(Debug, Error)]
pub enum HostingError {
    /// Looks like an infrastructure hiccup (HTML error page, timeout).
    #[error("transient GitHub API failure: {0}")]
    Transient(String),

    #[error("GitHub API is temporarily unavailable after {attempts} attempts; please retry later")]
    ServiceUnavailable { attempts: u32 },

    #[error("could not resolve to a repository: {0}")]
    NotResolved(String),

    #[error(
        "organization '{0}' was not found or is not visible to this token; check the name and that the token has read:org scope"
    )]
    OrganizationNotFound(String),

    #[error(
        "GitHub rejected the credentials ({0}); refresh GITHUB_TOKEN or run 'gh auth login'"
    )]
    Unauthorized(String),

    #[error("GitHub GraphQL query failed: {0}")]
    Query(String),

    #[error("failed to decode GitHub response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HostingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HostingError::Transient(_))
    }
}

/// Failures from the LLM API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The serialized prompt exceeds the model's context window.
    #[error("prompt is too large for the model context window: {0}")]
    PromptTooLarge(String),

    #[error("LLM API rejected the API key; check ANTHROPIC_API_KEY ({0})")]
    Authentication(String),

    #[error("LLM API rate limit reached; wait a minute and retry ({0})")]
    RateLimited(String),

    #[error("LLM API server error (status {status}); retry later: {message}")]
    Server { status: u16, message: String },

    #[error("LLM API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("LLM request transport failed: {0}")]
    Transport(String),

    #[error("LLM response did not contain any text")]
    EmptyResponse,
}

impl LlmError {
    pub fn is_prompt_too_large(&self) -> bool {
        matches!(self, LlmError::PromptTooLarge(_))
    }
}

/// Startup configuration problems; always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no GitHub token found; set GITHUB_TOKEN (or GH_TOKEN), or run 'gh auth login' first"
    )]
    MissingGitHubToken,

    #[error("no LLM API key found; set ANTHROPIC_API_KEY to run the analysis stages")]
    MissingLlmKey,
}
