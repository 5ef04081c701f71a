//! Stage orchestration: mine review activity, analyse it, generate the
//! reviewer prompt. Each stage leaves its artifacts on disk; a later failure
//! does not remove them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::{
    aggregate::{aggregate_activity, flatten_details, retain_contributors, top_n},
    bots::BotFilter,
    budget::{BudgetOutcome, estimate_tokens, run_with_budget},
    error::{HostingError, LlmError},
    fetch::ReviewFetcher,
    github::Hosting,
    llm::{CompletionRequest, LlmClient},
    prompts::{
        ANALYSIS_SYSTEM, PROMPT_SYSTEM, analysis_prompt, assemble_final, prompt_generation_prompt,
    },
    query::QueryExecutor,
    repos::{list_repositories, verify_access},
    report::{DetailsFile, DetailsMetadata, RunWindow, write_details_json, write_rankings_csv},
    types::{FetchMode, ReviewCommentDetail, UserActivity},
};

pub const ANALYSIS_MAX_TOKENS: u32 = 8192;
pub const PROMPT_MAX_TOKENS: u32 = 8192;

/// Artifact locations derived from one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub details_json: PathBuf,
    pub analysis_md: PathBuf,
    pub final_md: PathBuf,
}

impl OutputPaths {
    pub fn new(base: &str) -> Self {
        let base = base.strip_suffix(".md").unwrap_or(base);
        Self {
            details_json: PathBuf::from(format!("{base}-details.json")),
            analysis_md: PathBuf::from(format!("{base}-analysis.md")),
            final_md: PathBuf::from(format!("{base}.md")),
        }
    }
}

/// Observational progress from the mining stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    RepositoryStarted {
        repo: String,
        index: usize,
        total: usize,
    },
    PullRequestsProcessed {
        repo: String,
        count: usize,
    },
    RepositorySkipped {
        repo: String,
        reason: String,
    },
    RepositoryFinished {
        repo: String,
        pull_requests: usize,
        comments: usize,
    },
}

#[derive(Debug, Clone)]
pub struct MineOptions {
    pub org: String,
    pub repos: Option<Vec<String>>,
    pub top: usize,
    pub mode: FetchMode,
}

#[derive(Debug, Clone)]
pub struct MineReport {
    pub org: String,
    pub viewer: String,
    pub mode: FetchMode,
    pub analyzed_at: DateTime<Utc>,
    pub scanned: Vec<String>,
    pub skipped: Vec<String>,
    pub pull_requests_processed: usize,
    pub contributors_found: usize,
    pub top: Vec<UserActivity>,
    pub comments: Vec<ReviewCommentDetail>,
    pub details_path: PathBuf,
    pub rankings_path: PathBuf,
}

/// Fetches every repository in turn, ranks contributors, and writes the
/// details JSON plus the pull-request ranking CSV.
///
/// Repositories that cannot be resolved are skipped; any other hosting
/// error aborts the run.
pub async fn mine<H, P>(
    executor: &QueryExecutor<H>,
    bots: &BotFilter,
    options: &MineOptions,
    paths: &OutputPaths,
    mut on_progress: P,
) -> Result<MineReport>
where
    H: Hosting + Sync,
    P: FnMut(ProgressEvent),
{
    let org = options.org.as_str();
    let viewer = verify_access(executor, org).await?;
    let repos = list_repositories(executor, org, options.repos.as_deref()).await?;

    let fetcher = ReviewFetcher::new(executor, bots, org);
    let mut fetched = Vec::with_capacity(repos.len());
    let mut skipped = Vec::new();

    for (index, repo) in repos.iter().enumerate() {
        on_progress(ProgressEvent::RepositoryStarted {
            repo: repo.clone(),
            index,
            total: repos.len(),
        });

        let result = fetcher
            .fetch_repository(repo, &options.mode, |count| {
                on_progress(ProgressEvent::PullRequestsProcessed {
                    repo: repo.clone(),
                    count,
                })
            })
            .await;

        match result {
            Ok(activity) => {
                on_progress(ProgressEvent::RepositoryFinished {
                    repo: repo.clone(),
                    pull_requests: activity.pull_requests_processed,
                    comments: activity.details.len(),
                });
                fetched.push(activity);
            }
            Err(HostingError::NotResolved(reason)) => {
                warn!(repo = %repo, %reason, "Skipping repository");
                on_progress(ProgressEvent::RepositorySkipped {
                    repo: repo.clone(),
                    reason,
                });
                skipped.push(repo.clone());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to fetch reviews for '{repo}'"));
            }
        }
    }

    let ranked = aggregate_activity(fetched.iter().map(|r| &r.activity));
    let top = top_n(&ranked, options.top).to_vec();
    let comments = retain_contributors(flatten_details(&fetched), &top);
    let pull_requests_processed = fetched.iter().map(|r| r.pull_requests_processed).sum();

    let analyzed_at = Utc::now();
    let window = match options.mode {
        FetchMode::Since(since) => RunWindow::Since { since },
        FetchMode::MaxPullRequests(cap) => RunWindow::PrCount {
            pr_count_per_repo: cap,
            total_prs_analyzed: pull_requests_processed,
        },
    };
    let details = DetailsFile {
        metadata: DetailsMetadata {
            organization: org.to_string(),
            analyzed_at,
            total_repos_analyzed: fetched.len(),
            total_comments: comments.len(),
            window,
        },
        comments,
    };

    write_details_json(&paths.details_json, &details)?;
    let rankings_path = write_rankings_csv(&paths.details_json, &details.comments)?;

    info!(
        org,
        repositories = fetched.len(),
        skipped = skipped.len(),
        comments = details.comments.len(),
        "Mining complete"
    );

    Ok(MineReport {
        org: org.to_string(),
        viewer,
        mode: options.mode,
        analyzed_at,
        scanned: fetched.into_iter().map(|r| r.repo).collect(),
        skipped,
        pull_requests_processed,
        contributors_found: ranked.len(),
        top,
        comments: details.comments,
        details_path: paths.details_json.clone(),
        rankings_path,
    })
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub org: String,
    pub max_comments: Option<usize>,
    pub analysis_model: String,
    pub prompt_model: String,
}

#[derive(Debug, Clone)]
pub struct GuidanceReport {
    pub analysis_path: PathBuf,
    pub final_path: PathBuf,
    pub reviewers: Vec<String>,
    pub comments_per_reviewer: Option<usize>,
    pub attempts: u32,
}

/// First LLM pass, shrinking the per-reviewer comment cap while the prompt
/// is too large.
pub async fn generate_analysis<L: LlmClient + ?Sized>(
    llm: &L,
    org: &str,
    details: &[ReviewCommentDetail],
    max_comments: Option<usize>,
    model: &str,
) -> Result<BudgetOutcome<String>, LlmError> {
    run_with_budget(details, max_comments, |groups| {
        let prompt = analysis_prompt(org, &groups);
        debug!(
            reviewers = groups.len(),
            estimated_tokens = estimate_tokens(&prompt),
            "Built analysis prompt"
        );
        let request = CompletionRequest {
            model: model.to_string(),
            system: Some(ANALYSIS_SYSTEM.to_string()),
            prompt,
            max_tokens: ANALYSIS_MAX_TOKENS,
        };
        async move { llm.complete(&request).await }
    })
    .await
}

/// Second LLM pass: turns the analysis into a reviewer prompt.
pub async fn generate_prompt<L: LlmClient + ?Sized>(
    llm: &L,
    org: &str,
    analysis: &str,
    model: &str,
) -> Result<String, LlmError> {
    let request = CompletionRequest {
        model: model.to_string(),
        system: Some(PROMPT_SYSTEM.to_string()),
        prompt: prompt_generation_prompt(org, analysis),
        max_tokens: PROMPT_MAX_TOKENS,
    };
    llm.complete(&request).await
}

/// Runs both LLM passes and writes `<output>-analysis.md` and `<output>.md`.
pub async fn write_guidance<L: LlmClient + ?Sized>(
    llm: &L,
    details: &[ReviewCommentDetail],
    options: &AnalyzeOptions,
    paths: &OutputPaths,
) -> Result<GuidanceReport> {
    if details.is_empty() {
        bail!(
            "No review comments to analyse for '{}'; widen --since or --max-prs",
            options.org
        );
    }

    let outcome = generate_analysis(
        llm,
        &options.org,
        details,
        options.max_comments,
        &options.analysis_model,
    )
    .await
    .context("Analysis generation failed")?;
    write_text(&paths.analysis_md, &outcome.output)?;
    info!(
        path = %paths.analysis_md.display(),
        attempts = outcome.attempts,
        "Wrote analysis"
    );

    let generated = generate_prompt(llm, &options.org, &outcome.output, &options.prompt_model)
        .await
        .context("Prompt generation failed")?;

    let reviewers: Vec<String> = details
        .iter()
        .map(|d| d.reviewer.clone())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect();
    let final_text = assemble_final(
        &options.org,
        Utc::now().date_naive(),
        &reviewers,
        &generated,
    );
    write_text(&paths.final_md, &final_text)?;
    info!(path = %paths.final_md.display(), "Wrote reviewer prompt");

    Ok(GuidanceReport {
        analysis_path: paths.analysis_md.clone(),
        final_path: paths.final_md.clone(),
        reviewers,
        comments_per_reviewer: outcome.comments_per_reviewer,
        attempts: outcome.attempts,
    })
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("Failed to write '{}'", path.display()))
}
