//! review-miner: distils a GitHub organization's code review culture into a
//! prompt for AI review agents.
//!
//! Review verdicts and line comments are fetched repository by repository
//! through the GraphQL API, aggregated into a ranked contributor list, and
//! the top reviewers' comments are summarised by an LLM in two passes.

pub mod aggregate;
pub mod bots;
pub mod budget;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod github;
pub mod graphql;
pub mod input;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod query;
pub mod report;
pub mod repos;
pub mod types;

#[cfg(test)]
mod testing;

pub use bots::BotFilter;
pub use cli::{Command, Invocation, LlmPlan, MinePlan, parse_args};
pub use config::Settings;
pub use error::{ConfigError, HostingError, LlmError};
pub use github::{GitHub, Hosting};
pub use llm::{AnthropicClient, CompletionRequest, LlmClient};
pub use pipeline::{
    AnalyzeOptions, GuidanceReport, MineOptions, MineReport, OutputPaths, ProgressEvent, mine,
    write_guidance,
};
pub use query::QueryExecutor;
pub use types::{FetchMode, ReviewCommentDetail, UserActivity};
