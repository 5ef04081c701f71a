use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::{pipeline::MineOptions, types::FetchMode};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

pub const DEFAULT_OUTPUT: &str = "reviewer-prompt";
pub const DEFAULT_TOP: usize = 5;
const DEFAULT_LOOKBACK_MONTHS: u32 = 3;

#[derive(Args, Debug, Clone)]
struct MiningArgs {
    /// GitHub organization to mine
    #[arg(short = 'o', long, value_name = "ORG")]
    pub org: String,

    /// Only these repositories (comma-separated); default is every non-archived repository
    #[arg(short = 'r', long, value_name = "REPO,...", value_delimiter = ',')]
    pub repos: Vec<String>,

    /// Number of top reviewers to keep
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP, value_name = "NUM")]
    pub top: usize,

    /// Pull requests updated on or after this date (YYYY-MM-DD or RFC 3339; default 3 months ago)
    #[arg(long, value_name = "DATE", conflicts_with = "max_prs")]
    pub since: Option<String>,

    /// Most recently updated pull requests per repository, instead of a date window
    #[arg(long = "max-prs", value_name = "NUM")]
    pub max_prs: Option<usize>,

    /// Extra bot login pattern (regex, case-insensitive; can specify multiple)
    #[arg(long = "bot-pattern", value_name = "REGEX", allow_hyphen_values = true)]
    pub bot_patterns: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct LlmArgs {
    /// Maximum comments per reviewer sent to the analysis model
    #[arg(long = "max-comments", value_name = "NUM", help_heading = "Analysis")]
    pub max_comments: Option<usize>,

    /// Model for the analysis pass
    #[arg(long = "analysis-model", value_name = "MODEL", help_heading = "Analysis")]
    pub analysis_model: Option<String>,

    /// Model for the prompt-generation pass
    #[arg(long = "prompt-model", value_name = "MODEL", help_heading = "Analysis")]
    pub prompt_model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Mine review comments, analyse them, and generate the reviewer prompt
    Run {
        #[command(flatten)]
        mining: MiningArgs,
        #[command(flatten)]
        llm: LlmArgs,
        /// Base name for generated files
        #[arg(long, default_value = DEFAULT_OUTPUT, value_name = "BASE")]
        output: String,
    },
    /// Mine review comments only: ranked table, details JSON and PR ranking CSV
    Mine {
        #[command(flatten)]
        mining: MiningArgs,
        /// Base name for generated files
        #[arg(long, default_value = DEFAULT_OUTPUT, value_name = "BASE")]
        output: String,
    },
    /// Analyse an existing details file and generate the reviewer prompt
    Analyze {
        /// Details JSON written by 'mine' (either comments or reviews layout)
        #[arg(long, value_name = "PATH")]
        details: PathBuf,
        /// Organization name for the generated prompt (default: taken from the file)
        #[arg(short = 'o', long, value_name = "ORG")]
        org: Option<String>,
        #[command(flatten)]
        llm: LlmArgs,
        /// Base name for generated files
        #[arg(long, default_value = DEFAULT_OUTPUT, value_name = "BASE")]
        output: String,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "review-miner",
    about = "Mine a GitHub organization's code review comments and distil them into a review prompt for AI agents"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    /// Log progress details to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// What to mine, plus extra bot patterns for this run.
#[derive(Debug, Clone)]
pub struct MinePlan {
    pub options: MineOptions,
    pub bot_patterns: Vec<String>,
}

/// LLM overrides; `None` means use the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmPlan {
    pub max_comments: Option<usize>,
    pub analysis_model: Option<String>,
    pub prompt_model: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Run { mine: MinePlan, llm: LlmPlan },
    Mine { mine: MinePlan },
    Analyze {
        details: PathBuf,
        org: Option<String>,
        llm: LlmPlan,
    },
}

/// A validated command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub verbose: bool,
    pub output: String,
    pub command: Command,
}

impl MiningArgs {
    fn validate(&self) -> Result<()> {
        if self.org.trim().is_empty() {
            anyhow::bail!("--org must not be empty");
        }
        if self.top == 0 {
            anyhow::bail!("--top must be at least 1");
        }
        if self.max_prs == Some(0) {
            anyhow::bail!("--max-prs must be at least 1");
        }
        Ok(())
    }

    fn into_plan(self, now: DateTime<Utc>) -> Result<MinePlan> {
        self.validate()?;

        let mode = match (self.max_prs, self.since.as_deref()) {
            (Some(cap), _) => FetchMode::MaxPullRequests(cap),
            (None, Some(since)) => FetchMode::Since(parse_since(since)?),
            (None, None) => FetchMode::Since(default_since(now)),
        };

        let repos: Vec<String> = self
            .repos
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();

        Ok(MinePlan {
            options: MineOptions {
                org: self.org.trim().to_string(),
                repos: (!repos.is_empty()).then_some(repos),
                top: self.top,
                mode,
            },
            bot_patterns: self.bot_patterns,
        })
    }
}

impl LlmArgs {
    fn into_plan(self) -> Result<LlmPlan> {
        if self.max_comments == Some(0) {
            anyhow::bail!("--max-comments must be at least 1");
        }
        Ok(LlmPlan {
            max_comments: self.max_comments,
            analysis_model: self.analysis_model,
            prompt_model: self.prompt_model,
        })
    }
}

/// Accepts a plain date (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid --since '{value}'; expected YYYY-MM-DD or RFC 3339"))
}

/// Three calendar months before `now`.
pub fn default_since(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(DEFAULT_LOOKBACK_MONTHS))
        .unwrap_or(now)
}

fn build_invocation(cli: CliArgs, now: DateTime<Utc>) -> Result<Invocation> {
    let (output, command) = match cli.command {
        CliCommand::Run {
            mining,
            llm,
            output,
        } => (
            output,
            Command::Run {
                mine: mining.into_plan(now)?,
                llm: llm.into_plan()?,
            },
        ),
        CliCommand::Mine { mining, output } => (
            output,
            Command::Mine {
                mine: mining.into_plan(now)?,
            },
        ),
        CliCommand::Analyze {
            details,
            org,
            llm,
            output,
        } => (
            output,
            Command::Analyze {
                details,
                org: org.map(|o| o.trim().to_string()).filter(|o| !o.is_empty()),
                llm: llm.into_plan()?,
            },
        ),
    };

    if output.trim().is_empty() {
        anyhow::bail!("--output must not be empty");
    }

    Ok(Invocation {
        verbose: cli.verbose,
        output,
        command,
    })
}

/// Parses command-line arguments into a validated [`Invocation`].
///
/// Clap errors (including `--help` and `--version`) are returned inside the
/// `anyhow::Error` so the caller can decide how to exit.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    parse_args_at(args, Utc::now())
}

/// As [`parse_args`], with the clock used for the default `--since`.
pub fn parse_args_at<I, T>(args: I, now: DateTime<Utc>) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    build_invocation(cli, now)
}
