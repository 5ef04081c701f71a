use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use review_miner::{FetchMode, GuidanceReport, MineReport, ProgressEvent, UserActivity};

const TABLE_HEADERS: &[&str] = &[
    "RANK",
    "REVIEWER",
    "COMMENTS",
    "REVIEWS",
    "APPROVED",
    "CHANGES",
    "REPOS",
    "ACTIVE IN",
];
const REPOS_COLUMN_INDEX: usize = TABLE_HEADERS.len() - 1;
const COLUMN_SEPARATOR: &str = "  ";
const TRUNCATION_SUFFIX: &str = "...";
const MIN_REPOS_WIDTH_FOR_TRUNCATION: usize = 3;

fn get_terminal_width(width_override: Option<usize>) -> usize {
    if let Some(width) = width_override {
        width
    } else if io::stdout().is_terminal() {
        terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(usize::MAX)
    } else {
        usize::MAX
    }
}

fn contributor_to_row(rank: usize, user: &UserActivity) -> Vec<String> {
    vec![
        rank.to_string(),
        user.login.clone(),
        user.total_activity.to_string(),
        user.reviews_given.to_string(),
        user.approvals.to_string(),
        user.changes_requested.to_string(),
        user.repos_active_in.len().to_string(),
        user.repos_active_in
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(","),
    ]
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    widths
}

/// Shortens the trailing repository list so rows fit the terminal.
fn apply_repos_truncation(rows: &mut [Vec<String>], widths: &mut [usize], terminal_width: usize) {
    if terminal_width == usize::MAX {
        return;
    }

    let separator_width = COLUMN_SEPARATOR.len() * (widths.len() - 1);
    let fixed_width: usize = widths[..REPOS_COLUMN_INDEX].iter().sum::<usize>() + separator_width;
    if fixed_width >= terminal_width {
        return;
    }

    let available = terminal_width - fixed_width;
    if widths[REPOS_COLUMN_INDEX] <= available || available <= MIN_REPOS_WIDTH_FOR_TRUNCATION {
        return;
    }

    widths[REPOS_COLUMN_INDEX] = available;
    for row in rows {
        if let Some(repos) = row.get_mut(REPOS_COLUMN_INDEX)
            && repos.chars().count() > available
        {
            let keep = available - TRUNCATION_SUFFIX.len();
            let head: String = repos.chars().take(keep).collect();
            *repos = format!("{head}{TRUNCATION_SUFFIX}");
        }
    }
}

fn render_row<W: Write, S: AsRef<str>>(cells: &[S], widths: &[usize], writer: &mut W) -> Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i == cells.len() - 1 {
            // No padding on the last column.
            write!(writer, "{}", cell.as_ref())?;
        } else {
            write!(writer, "{:<width$}{COLUMN_SEPARATOR}", cell.as_ref(), width = widths[i])?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn render_table_separator<W: Write>(widths: &[usize], writer: &mut W) -> Result<()> {
    let line: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    writeln!(writer, "{}", line.join(COLUMN_SEPARATOR))?;
    Ok(())
}

fn window_description(mode: &FetchMode) -> String {
    match mode {
        FetchMode::Since(since) => format!("since {}", since.format("%Y-%m-%d")),
        FetchMode::MaxPullRequests(cap) => format!("last {cap} pull requests per repository"),
    }
}

pub fn display_contributor_table<W: Write>(
    report: &MineReport,
    width_override: Option<usize>,
    writer: &mut W,
) -> Result<()> {
    writeln!(
        writer,
        "Top {} reviewers in {} ({}, {} contributors found)",
        report.top.len(),
        report.org,
        window_description(&report.mode),
        report.contributors_found
    )?;
    writeln!(writer)?;

    if report.top.is_empty() {
        writeln!(writer, "No review activity found.")?;
        return Ok(());
    }

    let mut rows: Vec<Vec<String>> = report
        .top
        .iter()
        .enumerate()
        .map(|(i, user)| contributor_to_row(i + 1, user))
        .collect();
    let mut widths = calculate_column_widths(TABLE_HEADERS, &rows);
    apply_repos_truncation(&mut rows, &mut widths, get_terminal_width(width_override));

    render_row(TABLE_HEADERS, &widths, writer)?;
    render_table_separator(&widths, writer)?;
    for row in &rows {
        render_row(row.as_slice(), &widths, writer)?;
    }
    Ok(())
}

/// One stderr line per repository event; page updates only when verbose.
pub fn render_progress<W: Write>(event: &ProgressEvent, verbose: bool, writer: &mut W) -> Result<()> {
    match event {
        ProgressEvent::RepositoryStarted { repo, index, total } => {
            writeln!(writer, "[{}/{}] {repo}", index + 1, total)?;
        }
        ProgressEvent::PullRequestsProcessed { repo, count } if verbose => {
            writeln!(writer, "      {repo}: {count} pull requests processed")?;
        }
        ProgressEvent::PullRequestsProcessed { .. } => {}
        ProgressEvent::RepositorySkipped { repo, reason } => {
            writeln!(writer, "      skipped {repo}: {reason}")?;
        }
        ProgressEvent::RepositoryFinished {
            repo,
            pull_requests,
            comments,
        } => {
            writeln!(
                writer,
                "      {repo}: {pull_requests} pull requests, {comments} comments"
            )?;
        }
    }
    Ok(())
}

pub fn display_mine_summary<W: Write>(report: &MineReport, writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    writeln!(
        writer,
        "Scanned {} repositories ({} skipped), {} pull requests",
        report.scanned.len(),
        report.skipped.len(),
        report.pull_requests_processed
    )?;
    if !report.skipped.is_empty() {
        writeln!(writer, "Skipped: {}", report.skipped.join(", "))?;
    }
    writeln!(
        writer,
        "Kept {} comments from the top {} reviewers",
        report.comments.len(),
        report.top.len()
    )?;
    writeln!(writer, "Details:  {}", report.details_path.display())?;
    writeln!(writer, "Rankings: {}", report.rankings_path.display())?;
    Ok(())
}

pub fn display_guidance_summary<W: Write>(report: &GuidanceReport, writer: &mut W) -> Result<()> {
    if let Some(cap) = report.comments_per_reviewer {
        writeln!(
            writer,
            "Analysis used at most {cap} comments per reviewer ({} attempts)",
            report.attempts
        )?;
    }
    writeln!(writer, "Analysis: {}", report.analysis_path.display())?;
    writeln!(writer, "Prompt:   {}", report.final_path.display())?;
    Ok(())
}
