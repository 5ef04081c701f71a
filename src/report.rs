use std::{
    borrow::Cow,
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{PrState, ReviewCommentDetail};

pub const RANKINGS_CSV_HEADER: &str =
    "rank,repo,pr_number,pr_title,pr_author,total_comments,reviewer_count,state,pr_url";

/// Which window a details file was mined with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunWindow {
    #[serde(rename_all = "camelCase")]
    PrCount {
        pr_count_per_repo: usize,
        #[serde(rename = "totalPRsAnalyzed")]
        total_prs_analyzed: usize,
    },
    Since {
        since: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsMetadata {
    pub organization: String,
    pub analyzed_at: DateTime<Utc>,
    pub total_repos_analyzed: usize,
    pub total_comments: usize,
    #[serde(flatten)]
    pub window: RunWindow,
}

/// Contents of `<output>-details.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsFile {
    pub metadata: DetailsMetadata,
    pub comments: Vec<ReviewCommentDetail>,
}

pub fn write_details_json(path: &Path, details: &DetailsFile) -> Result<()> {
    let json = serde_json::to_string_pretty(details).context("Failed to serialize details")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write details file '{}'", path.display()))
}

/// One row of the pull-request ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRankingRow {
    pub rank: usize,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
    pub total_comments: usize,
    pub reviewer_count: usize,
    pub state: PrState,
}

/// Groups comments by (repository, number) and ranks pull requests by
/// comment volume. Equal counts keep first-appearance order.
pub fn aggregate_pr_rankings(details: &[ReviewCommentDetail]) -> Vec<PrRankingRow> {
    let mut groups: IndexMap<(&str, u64), (&ReviewCommentDetail, usize, HashSet<&str>)> =
        IndexMap::new();

    for detail in details {
        let entry = groups
            .entry((detail.pr.repo.as_str(), detail.pr.number))
            .or_insert_with(|| (detail, 0, HashSet::new()));
        entry.1 += 1;
        entry.2.insert(detail.reviewer.as_str());
    }

    let mut rows: Vec<PrRankingRow> = groups
        .into_values()
        .map(|(first, total_comments, reviewers)| PrRankingRow {
            rank: 0,
            repo: first.pr.repo.clone(),
            number: first.pr.number,
            title: first.pr.title.clone(),
            author: first.pr.author.clone(),
            url: first.pr.url.clone(),
            total_comments,
            reviewer_count: reviewers.len(),
            state: first.pr.state,
        })
        .collect();

    rows.sort_by(|a, b| b.total_comments.cmp(&a.total_comments));
    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }
    rows
}

/// Quotes a field when it holds a comma, quote or line break; inner quotes
/// are doubled.
pub fn csv_escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

pub fn render_rankings_csv(rows: &[PrRankingRow]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(RANKINGS_CSV_HEADER);
    out.push('\n');

    for row in rows {
        let fields = [
            Cow::Owned(row.rank.to_string()),
            csv_escape(&row.repo),
            Cow::Owned(row.number.to_string()),
            csv_escape(&row.title),
            csv_escape(&row.author),
            Cow::Owned(row.total_comments.to_string()),
            Cow::Owned(row.reviewer_count.to_string()),
            Cow::Borrowed(row.state.as_str()),
            csv_escape(&row.url),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// `foo.json` becomes `foo-pr-rankings.csv`; anything else gets the suffix
/// appended.
pub fn rankings_csv_path(json_path: &Path) -> PathBuf {
    let raw = json_path.to_string_lossy();
    let stem = raw.strip_suffix(".json").unwrap_or(&raw);
    PathBuf::from(format!("{stem}-pr-rankings.csv"))
}

/// Derives the ranking from `details` and writes it beside the JSON file.
pub fn write_rankings_csv(json_path: &Path, details: &[ReviewCommentDetail]) -> Result<PathBuf> {
    let path = rankings_csv_path(json_path);
    let rows = aggregate_pr_rankings(details);
    fs::write(&path, render_rankings_csv(&rows))
        .with_context(|| format!("Failed to write rankings file '{}'", path.display()))?;
    Ok(path)
}
