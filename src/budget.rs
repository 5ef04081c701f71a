use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{error::LlmError, types::ReviewCommentDetail};

/// Never shrink below one comment per reviewer.
pub const MIN_COMMENTS_PER_REVIEWER: usize = 1;

/// One reviewer's comments as handed to the analysis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerGroup {
    pub reviewer: String,
    pub comments: Vec<ReviewCommentDetail>,
    pub count: usize,
}

/// Groups comments by reviewer in first-appearance order.
///
/// With a `limit`, each group keeps only its `limit` most recent comments,
/// newest first.
pub fn group_by_reviewer(
    details: &[ReviewCommentDetail],
    limit: Option<usize>,
) -> Vec<ReviewerGroup> {
    let mut by_reviewer: IndexMap<&str, Vec<ReviewCommentDetail>> = IndexMap::new();
    for detail in details {
        by_reviewer
            .entry(detail.reviewer.as_str())
            .or_default()
            .push(detail.clone());
    }

    by_reviewer
        .into_iter()
        .map(|(reviewer, mut comments)| {
            if let Some(limit) = limit {
                comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                comments.truncate(limit);
            }
            ReviewerGroup {
                reviewer: reviewer.to_string(),
                count: comments.len(),
                comments,
            }
        })
        .collect()
}

/// Rough token count: four bytes per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[derive(Debug)]
pub struct BudgetOutcome<T> {
    pub output: T,
    /// Per-reviewer cap the successful call ran with, if any.
    pub comments_per_reviewer: Option<usize>,
    pub attempts: u32,
}

/// Calls `call` with grouped comments, shrinking the per-reviewer cap by
/// bisection while the call reports the prompt as too large.
///
/// The upper bound starts at `configured_cap` (or the largest group) and
/// only ever decreases. Each retry tries the midpoint between the floor and
/// the last failing cap; once that midpoint no longer shrinks the bound the
/// last prompt-too-large error is returned. Any other error returns at once.
pub async fn run_with_budget<T, F, Fut>(
    details: &[ReviewCommentDetail],
    configured_cap: Option<usize>,
    mut call: F,
) -> Result<BudgetOutcome<T>, LlmError>
where
    F: FnMut(Vec<ReviewerGroup>) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let initial = group_by_reviewer(details, configured_cap);
    let largest = initial.iter().map(|g| g.count).max().unwrap_or(0);
    let mut current_max = configured_cap.map_or(largest, |cap| cap.min(largest));
    let mut limit = configured_cap;
    let mut groups = initial;
    let mut attempts = 0;

    loop {
        attempts += 1;
        debug!(
            attempt = attempts,
            reviewers = groups.len(),
            cap = ?limit,
            "Calling analysis"
        );

        let err = match call(groups).await {
            Ok(output) => {
                return Ok(BudgetOutcome {
                    output,
                    comments_per_reviewer: limit,
                    attempts,
                });
            }
            Err(err) if err.is_prompt_too_large() => err,
            Err(err) => return Err(err),
        };

        let next = (MIN_COMMENTS_PER_REVIEWER + current_max) / 2;
        if next >= current_max || next < MIN_COMMENTS_PER_REVIEWER {
            warn!(
                cap = current_max,
                "Prompt still too large at the smallest comment cap"
            );
            return Err(err);
        }

        warn!(
            from = current_max,
            to = next,
            "Prompt too large; reducing comments per reviewer"
        );
        current_max = next;
        limit = Some(next);
        groups = group_by_reviewer(details, limit);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::types::{PrState, PullRequestRef};

    fn comment(reviewer: &str, minutes: i64) -> ReviewCommentDetail {
        ReviewCommentDetail {
            reviewer: reviewer.to_string(),
            body: format!("{reviewer} at {minutes}"),
            diff_hunk: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            pr: PullRequestRef {
                repo: "api".to_string(),
                number: 1,
                title: "Change".to_string(),
                author: "carol".to_string(),
                url: "https://github.com/acme/api/pull/1".to_string(),
                state: PrState::Open,
            },
        }
    }

    fn eight_by_alice_two_by_bob() -> Vec<ReviewCommentDetail> {
        let mut details: Vec<_> = (0..8).map(|m| comment("alice", m)).collect();
        details.insert(1, comment("bob", 100));
        details.push(comment("bob", 50));
        details
    }

    fn too_large() -> LlmError {
        LlmError::PromptTooLarge("prompt is too long".to_string())
    }

    #[test]
    fn groups_follow_first_appearance() {
        let groups = group_by_reviewer(&eight_by_alice_two_by_bob(), None);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].reviewer, "alice");
        assert_eq!(groups[0].count, 8);
        assert_eq!(groups[1].reviewer, "bob");
        assert_eq!(groups[1].count, 2);
        assert_eq!(groups[1].comments[0].body, "bob at 100");
    }

    #[test]
    fn limit_keeps_most_recent() {
        let groups = group_by_reviewer(&eight_by_alice_two_by_bob(), Some(3));

        let alice: Vec<&str> = groups[0].comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(alice, vec!["alice at 7", "alice at 6", "alice at 5"]);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[1].count, 2);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn first_success_needs_no_cap() {
        let details = eight_by_alice_two_by_bob();

        let outcome = run_with_budget(&details, None, |groups| async move {
            Ok::<_, LlmError>(groups.len())
        })
        .await
        .unwrap();

        assert_eq!(outcome.output, 2);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.comments_per_reviewer, None);
    }

    #[tokio::test]
    async fn always_too_large_terminates_with_token_error() {
        let details = eight_by_alice_two_by_bob();
        let mut caps = Vec::new();

        let err = run_with_budget(&details, None, |groups| {
            caps.push(groups.iter().map(|g| g.count).max().unwrap_or(0));
            async { Err::<(), _>(too_large()) }
        })
        .await
        .unwrap_err();

        assert!(err.is_prompt_too_large());
        assert_eq!(caps, vec![8, 4, 2, 1]);
    }

    #[tokio::test]
    async fn shrinks_until_the_prompt_fits() {
        let details = eight_by_alice_two_by_bob();
        let mut caps = Vec::new();

        let outcome = run_with_budget(&details, None, |groups| {
            let largest = groups.iter().map(|g| g.count).max().unwrap_or(0);
            caps.push(largest);
            async move {
                if largest > 3 {
                    Err(too_large())
                } else {
                    Ok(format!("analysed {largest}"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(caps, vec![8, 4, 2]);
        assert_eq!(outcome.output, "analysed 2");
        assert_eq!(outcome.comments_per_reviewer, Some(2));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn configured_cap_is_the_starting_bound() {
        let details = eight_by_alice_two_by_bob();
        let mut caps = Vec::new();

        let _ = run_with_budget(&details, Some(5), |groups| {
            caps.push(groups.iter().map(|g| g.count).max().unwrap_or(0));
            async { Err::<(), _>(too_large()) }
        })
        .await;

        assert_eq!(caps, vec![5, 3, 2, 1]);
    }

    #[tokio::test]
    async fn other_errors_abort_immediately() {
        let details = eight_by_alice_two_by_bob();
        let mut calls = 0;

        let err = run_with_budget(&details, None, |_| {
            calls += 1;
            async {
                Err::<(), _>(LlmError::Authentication("invalid x-api-key".to_string()))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LlmError::Authentication(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn empty_input_fails_without_retrying() {
        let mut calls = 0;

        let err = run_with_budget(&[], None, |_| {
            calls += 1;
            async { Err::<(), _>(too_large()) }
        })
        .await
        .unwrap_err();

        assert!(err.is_prompt_too_large());
        assert_eq!(calls, 1);
    }
}
