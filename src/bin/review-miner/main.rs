mod display;

use anyhow::{Context, Result};
use review_miner::{
    AnalyzeOptions, AnthropicClient, BotFilter, Command, GitHub, LlmPlan, MinePlan, MineReport,
    OutputPaths, QueryExecutor, Settings, input::load_review_comments, mine, parse_args,
    write_guidance,
};

use display::{
    display_contributor_table, display_guidance_summary, display_mine_summary, render_progress,
};

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run_mine(
    settings: &Settings,
    plan: &MinePlan,
    paths: &OutputPaths,
    verbose: bool,
) -> Result<MineReport> {
    let token = Settings::github_token()?;
    let bots = BotFilter::with_extra_patterns(&plan.bot_patterns)
        .context("Invalid --bot-pattern regex")?;
    let executor = QueryExecutor::with_policies(
        GitHub::connect(&token, None)?,
        settings.retry,
        settings.rate_limit,
    );

    let mut stderr = std::io::stderr();
    let report = mine(&executor, &bots, &plan.options, paths, |event| {
        // Progress is best effort; a closed stderr must not abort mining.
        let _ = render_progress(&event, verbose, &mut stderr);
    })
    .await?;

    let mut stdout = std::io::stdout();
    display_contributor_table(&report, None, &mut stdout)?;
    display_mine_summary(&report, &mut stdout)?;
    Ok(report)
}

async fn run_guidance(
    settings: &Settings,
    org: String,
    details: &[review_miner::ReviewCommentDetail],
    llm_plan: &LlmPlan,
    paths: &OutputPaths,
) -> Result<()> {
    let client = AnthropicClient::new(
        settings.llm_api_key()?,
        &settings.anthropic_base_url,
        settings.http_timeout,
    )?;
    let options = AnalyzeOptions {
        org,
        max_comments: llm_plan.max_comments,
        analysis_model: llm_plan
            .analysis_model
            .clone()
            .unwrap_or_else(|| settings.analysis_model.clone()),
        prompt_model: llm_plan
            .prompt_model
            .clone()
            .unwrap_or_else(|| settings.prompt_model.clone()),
    };

    let report = write_guidance(&client, details, &options, paths).await?;
    display_guidance_summary(&report, &mut std::io::stdout())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = match parse_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };
    init_tracing(invocation.verbose);

    let settings = Settings::from_env();
    let paths = OutputPaths::new(&invocation.output);

    match invocation.command {
        Command::Mine { mine } => {
            run_mine(&settings, &mine, &paths, invocation.verbose).await?;
        }
        Command::Run { mine, llm } => {
            // Fail on a missing key before spending API quota on mining.
            settings.llm_api_key()?;
            let report = run_mine(&settings, &mine, &paths, invocation.verbose).await?;
            run_guidance(&settings, report.org, &report.comments, &llm, &paths).await?;
        }
        Command::Analyze { details, org, llm } => {
            let loaded = load_review_comments(&details)?;
            let org = org
                .or_else(|| loaded.metadata.as_ref().map(|m| m.organization.clone()))
                .context("No organization in the details file; pass --org")?;
            run_guidance(&settings, org, &loaded.comments, &llm, &paths).await?;
        }
    }

    Ok(())
}
