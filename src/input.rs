use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::{
    report::DetailsMetadata,
    types::{PullRequestRef, ReviewCommentDetail},
};

/// Shape of a details file, resolved once when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `{ metadata, comments: [...] }` as written by the mining stage.
    Comments,
    /// `{ reviews: [...] }`, reviews carrying nested line comments.
    Reviews,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Comments {
        #[serde(default)]
        metadata: Option<DetailsMetadata>,
        comments: Vec<ReviewCommentDetail>,
    },
    Reviews {
        reviews: Vec<LegacyReview>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyReview {
    reviewer: String,
    #[serde(alias = "pullRequest")]
    pr: PullRequestRef,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    comments: Vec<LegacyComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyComment {
    body: String,
    #[serde(default)]
    diff_hunk: Option<String>,
    created_at: DateTime<Utc>,
}

/// Review comments loaded from disk, normalised to one shape.
#[derive(Debug)]
pub struct LoadedComments {
    pub format: InputFormat,
    pub metadata: Option<DetailsMetadata>,
    pub comments: Vec<ReviewCommentDetail>,
}

pub fn load_review_comments(path: &Path) -> Result<LoadedComments> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read details file '{}'", path.display()))?;
    let loaded = parse_review_comments(&text)
        .with_context(|| format!("Unrecognised details file '{}'", path.display()))?;
    debug!(
        path = %path.display(),
        format = ?loaded.format,
        comments = loaded.comments.len(),
        "Loaded review comments"
    );
    Ok(loaded)
}

pub fn parse_review_comments(text: &str) -> Result<LoadedComments> {
    let raw: RawInput = serde_json::from_str(text)
        .context("expected an object with either a 'comments' or a 'reviews' array")?;

    Ok(match raw {
        RawInput::Comments { metadata, comments } => LoadedComments {
            format: InputFormat::Comments,
            metadata,
            comments,
        },
        RawInput::Reviews { reviews } => LoadedComments {
            format: InputFormat::Reviews,
            metadata: None,
            comments: reviews.into_iter().flat_map(normalise_review).collect(),
        },
    })
}

/// A non-empty review body counts as one more comment, timestamped with the
/// review submission (or its first line comment when that is missing).
fn normalise_review(review: LegacyReview) -> Vec<ReviewCommentDetail> {
    let mut out = Vec::with_capacity(review.comments.len() + 1);

    let summary_at = review
        .submitted_at
        .or_else(|| review.comments.first().map(|c| c.created_at));
    if let (Some(body), Some(created_at)) = (review.body.as_deref(), summary_at) {
        if !body.trim().is_empty() {
            out.push(ReviewCommentDetail {
                reviewer: review.reviewer.clone(),
                body: body.to_string(),
                diff_hunk: String::new(),
                created_at,
                pr: review.pr.clone(),
            });
        }
    }

    for comment in review.comments {
        out.push(ReviewCommentDetail {
            reviewer: review.reviewer.clone(),
            body: comment.body,
            diff_hunk: comment.diff_hunk.unwrap_or_default(),
            created_at: comment.created_at,
            pr: review.pr.clone(),
        });
    }
    out
}
