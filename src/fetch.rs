use serde_json::json;
use tracing::{debug, info};

use crate::{
    bots::BotFilter,
    error::HostingError,
    github::Hosting,
    graphql::{Actor, PULL_REQUESTS_QUERY, PullRequestNode, PullRequestsData},
    query::QueryExecutor,
    types::{FetchMode, RepoActivity, ReviewCommentDetail},
};

/// Walks the pull requests of one organization's repositories and turns
/// review verdicts and line comments into activity counters.
pub struct ReviewFetcher<'a, H> {
    executor: &'a QueryExecutor<H>,
    bots: &'a BotFilter,
    org: &'a str,
}

impl<'a, H: Hosting + Sync> ReviewFetcher<'a, H> {
    pub fn new(executor: &'a QueryExecutor<H>, bots: &'a BotFilter, org: &'a str) -> Self {
        Self {
            executor,
            bots,
            org,
        }
    }

    /// Fetches review activity for `repo`, newest pull requests first.
    ///
    /// Relies on GitHub returning pull requests in descending `updatedAt`
    /// order: in since-mode the first pull request older than the boundary
    /// ends the whole walk. `progress` receives the running count of pull
    /// requests processed after every page.
    pub async fn fetch_repository<F>(
        &self,
        repo: &str,
        mode: &FetchMode,
        mut progress: F,
    ) -> Result<RepoActivity, HostingError>
    where
        F: FnMut(usize),
    {
        let mut result = RepoActivity::new(repo);
        if mode.exhausted(0) {
            return Ok(result);
        }

        self.executor.ensure_quota().await?;

        let mut after: Option<String> = None;
        let mut has_more = true;

        while has_more {
            let data: PullRequestsData = self
                .executor
                .execute(
                    PULL_REQUESTS_QUERY,
                    json!({ "owner": self.org, "repo": repo, "after": after }),
                )
                .await?;
            let repository = data.repository.ok_or_else(|| {
                HostingError::NotResolved(format!("{}/{}", self.org, repo))
            })?;
            let connection = repository.pull_requests;

            after = connection.page_info.next_cursor();
            has_more = after.is_some();

            for pr in connection.nodes {
                if mode.stops_before(pr.updated_at, result.pull_requests_processed) {
                    debug!(repo, pr = pr.number, updated_at = %pr.updated_at, "Reached end of window");
                    has_more = false;
                    break;
                }
                record_pull_request(&mut result, &pr, mode, self.bots);
                result.pull_requests_processed += 1;
            }

            if mode.exhausted(result.pull_requests_processed) {
                has_more = false;
            }

            progress(result.pull_requests_processed);

            if has_more {
                if let Some(rate_limit) = &data.rate_limit {
                    self.executor.throttle(rate_limit).await;
                }
            }
        }

        info!(
            repo,
            pull_requests = result.pull_requests_processed,
            reviewers = result.activity.len(),
            comments = result.details.len(),
            "Fetched review activity"
        );
        Ok(result)
    }
}

/// Folds one pull request into `acc`.
///
/// Verdicts and comments are judged one by one: bots and the pull request's
/// own author are dropped, as is anything outside the fetch window.
pub fn record_pull_request(
    acc: &mut RepoActivity,
    pr: &PullRequestNode,
    mode: &FetchMode,
    bots: &BotFilter,
) {
    let pr_author = pr.author_login();
    let counts = |actor: &Actor| {
        !bots.is_bot_author(&actor.login, actor.typename.as_deref())
            && !actor.login.eq_ignore_ascii_case(pr_author)
    };
    let repo = acc.repo.clone();

    for review in &pr.reviews.nodes {
        let Some(author) = review.author.as_ref().filter(|a| counts(a)) else {
            continue;
        };
        if !review.state.is_counted() || !mode.admits(review.created_at) {
            continue;
        }
        // Verdicts raise reviews_given only; total_activity tracks written
        // comments.
        acc.user_mut(&author.login)
            .record_verdict(review.state, &repo);
    }

    let pr_ref = pr.to_ref(&repo);
    for thread in &pr.review_threads.nodes {
        for comment in &thread.comments.nodes {
            let Some(author) = comment.author.as_ref().filter(|a| counts(a)) else {
                continue;
            };
            if !mode.admits(comment.created_at) {
                continue;
            }
            acc.user_mut(&author.login).record_comment(&repo);
            acc.details.push(ReviewCommentDetail {
                reviewer: author.login.clone(),
                body: comment.body.clone(),
                diff_hunk: comment.diff_hunk.clone().unwrap_or_default(),
                created_at: comment.created_at,
                pr: pr_ref.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Value;

    use super::*;
    use crate::{
        error::HostingError,
        testing::{FnHosting, is_rate_limit_probe, plenty_of_quota},
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn actor(login: &str) -> Value {
        json!({ "login": login, "__typename": if login.ends_with("[bot]") { "Bot" } else { "User" } })
    }

    fn comment(author: &str, body: &str, at: DateTime<Utc>) -> Value {
        json!({ "author": actor(author), "body": body, "diffHunk": "@@ -1 +1 @@", "createdAt": at })
    }

    fn review(author: &str, state: &str, at: DateTime<Utc>) -> Value {
        json!({ "author": actor(author), "state": state, "createdAt": at })
    }

    fn pr(number: u64, author: &str, updated: DateTime<Utc>, reviews: Vec<Value>, comments: Vec<Value>) -> Value {
        json!({
            "number": number,
            "title": format!("PR {number}"),
            "url": format!("https://github.com/acme/api/pull/{number}"),
            "state": "OPEN",
            "updatedAt": updated,
            "author": actor(author),
            "reviews": { "nodes": reviews },
            "reviewThreads": { "nodes": [ { "comments": { "nodes": comments } } ] }
        })
    }

    fn page(nodes: Vec<Value>, next: Option<&str>) -> Value {
        json!({
            "data": {
                "repository": {
                    "pullRequests": {
                        "nodes": nodes,
                        "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next }
                    }
                },
                "rateLimit": { "remaining": 4000, "resetAt": "2030-01-01T00:00:00Z" }
            }
        })
    }

    fn node(value: Value) -> PullRequestNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn verdicts_and_comments_are_counted_separately() {
        let mut acc = RepoActivity::new("api");
        let mode = FetchMode::MaxPullRequests(10);
        let pr = node(pr(
            1,
            "carol",
            t0(),
            vec![
                review("alice", "APPROVED", t0()),
                review("bob", "CHANGES_REQUESTED", t0()),
                review("bob", "COMMENTED", t0()),
                review("dave", "DISMISSED", t0()),
                review("erin", "PENDING", t0()),
            ],
            vec![comment("alice", "nit", t0()), comment("alice", "typo", t0())],
        ));

        record_pull_request(&mut acc, &pr, &mode, &BotFilter::default());

        let alice = &acc.activity["alice"];
        assert_eq!(alice.reviews_given, 1);
        assert_eq!(alice.approvals, 1);
        assert_eq!(alice.review_comments, 2);
        assert_eq!(alice.total_activity, 2);

        let bob = &acc.activity["bob"];
        assert_eq!(bob.reviews_given, 2);
        assert_eq!(bob.changes_requested, 1);
        assert_eq!(bob.total_activity, 0);

        assert!(!acc.activity.contains_key("dave"));
        assert!(!acc.activity.contains_key("erin"));
        assert_eq!(acc.details.len(), 2);
        assert_eq!(acc.details[0].pr.author, "carol");
        assert_eq!(acc.details[0].pr.repo, "api");
    }

    #[test]
    fn bots_contribute_nothing() {
        let mut acc = RepoActivity::new("api");
        let pr = node(pr(
            1,
            "carol",
            t0(),
            vec![review("renovate", "APPROVED", t0())],
            vec![
                comment("dependabot[bot]", "bump", t0()),
                comment("github-actions", "lint failed", t0()),
            ],
        ));

        record_pull_request(&mut acc, &pr, &FetchMode::MaxPullRequests(5), &BotFilter::default());

        assert!(acc.activity.is_empty());
        assert!(acc.details.is_empty());
    }

    #[test]
    fn self_review_is_excluded_case_insensitively() {
        let mut acc = RepoActivity::new("api");
        let bots = BotFilter::default();
        let mode = FetchMode::MaxPullRequests(5);
        let own = node(pr(
            1,
            "Alice",
            t0(),
            vec![review("alice", "COMMENTED", t0())],
            vec![comment("ALICE", "note to self", t0())],
        ));
        let other = node(pr(2, "bob", t0(), vec![], vec![comment("alice", "looks off", t0())]));

        record_pull_request(&mut acc, &own, &mode, &bots);
        assert!(acc.activity.is_empty());

        record_pull_request(&mut acc, &other, &mode, &bots);
        assert_eq!(acc.activity["alice"].review_comments, 1);
        assert_eq!(acc.details.len(), 1);
        assert_eq!(acc.details[0].pr.number, 2);
    }

    #[test]
    fn since_mode_drops_feedback_before_boundary() {
        let mut acc = RepoActivity::new("api");
        let pr = node(pr(
            1,
            "carol",
            t0() + Duration::days(2),
            vec![review("alice", "APPROVED", t0() - Duration::days(1))],
            vec![
                comment("alice", "old", t0() - Duration::days(1)),
                comment("alice", "new", t0() + Duration::days(1)),
            ],
        ));

        record_pull_request(&mut acc, &pr, &FetchMode::Since(t0()), &BotFilter::default());

        let alice = &acc.activity["alice"];
        assert_eq!(alice.reviews_given, 0);
        assert_eq!(alice.review_comments, 1);
        assert_eq!(acc.details[0].body, "new");
    }

    #[tokio::test]
    async fn since_walk_stops_at_first_older_pull_request() {
        let t = t0();
        let executor = QueryExecutor::new(FnHosting::new(move |payload| {
            if is_rate_limit_probe(payload) {
                return Ok(plenty_of_quota());
            }
            match payload["variables"]["after"].as_str() {
                None => Ok(page(
                    vec![
                        pr(3, "carol", t + Duration::hours(10), vec![], vec![comment("alice", "a", t + Duration::hours(9))]),
                        pr(2, "carol", t + Duration::hours(5), vec![], vec![comment("bob", "b", t + Duration::hours(4))]),
                        pr(1, "carol", t - Duration::hours(1), vec![], vec![comment("dave", "c", t + Duration::hours(1))]),
                    ],
                    Some("more"),
                )),
                Some(cursor) => panic!("walk should have stopped, got cursor {cursor}"),
            }
        }));
        let bots = BotFilter::default();
        let fetcher = ReviewFetcher::new(&executor, &bots, "acme");
        let mut seen = Vec::new();

        let result = fetcher
            .fetch_repository("api", &FetchMode::Since(t), |n| seen.push(n))
            .await
            .unwrap();

        assert_eq!(result.pull_requests_processed, 2);
        assert!(!result.activity.contains_key("dave"));
        assert_eq!(seen, vec![2]);
        assert_eq!(executor.hosting().calls_matching("pullRequests("), 1);
    }

    #[tokio::test]
    async fn max_mode_stops_at_cap_across_pages() {
        let t = t0();
        let executor = QueryExecutor::new(FnHosting::new(move |payload| {
            if is_rate_limit_probe(payload) {
                return Ok(plenty_of_quota());
            }
            let old = t - Duration::days(400);
            match payload["variables"]["after"].as_str() {
                None => Ok(page(
                    vec![
                        pr(5, "carol", t, vec![], vec![comment("alice", "x", old)]),
                        pr(4, "carol", old, vec![], vec![comment("alice", "y", old)]),
                    ],
                    Some("p2"),
                )),
                Some("p2") => Ok(page(
                    vec![
                        pr(3, "carol", old, vec![], vec![comment("bob", "z", old)]),
                        pr(2, "carol", old, vec![], vec![comment("dave", "w", old)]),
                    ],
                    Some("p3"),
                )),
                Some(cursor) => panic!("cap should have stopped the walk, got {cursor}"),
            }
        }));
        let bots = BotFilter::default();
        let fetcher = ReviewFetcher::new(&executor, &bots, "acme");
        let mut seen = Vec::new();

        let result = fetcher
            .fetch_repository("api", &FetchMode::MaxPullRequests(3), |n| seen.push(n))
            .await
            .unwrap();

        assert_eq!(result.pull_requests_processed, 3);
        assert_eq!(result.activity["alice"].total_activity, 2);
        assert_eq!(result.activity["bob"].total_activity, 1);
        assert!(!result.activity.contains_key("dave"));
        assert_eq!(seen, vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn low_quota_between_pages_waits_for_reset() {
        let t = t0();
        let executor = QueryExecutor::new(FnHosting::new(move |payload| {
            if is_rate_limit_probe(payload) {
                return Ok(plenty_of_quota());
            }
            match payload["variables"]["after"].as_str() {
                None => {
                    let mut first = page(vec![pr(2, "carol", t, vec![], vec![])], Some("p2"));
                    first["data"]["rateLimit"] = json!({
                        "remaining": 10,
                        "resetAt": Utc::now() + Duration::seconds(120)
                    });
                    Ok(first)
                }
                Some(_) => Ok(page(vec![pr(1, "carol", t, vec![], vec![])], None)),
            }
        }));
        let bots = BotFilter::default();
        let fetcher = ReviewFetcher::new(&executor, &bots, "acme");
        let before = tokio::time::Instant::now();

        let result = fetcher
            .fetch_repository("api", &FetchMode::MaxPullRequests(10), |_| {})
            .await
            .unwrap();

        assert_eq!(result.pull_requests_processed, 2);
        assert!(before.elapsed() >= std::time::Duration::from_secs(120));
    }

    #[tokio::test]
    async fn unresolvable_repository_is_reported() {
        let executor = QueryExecutor::new(FnHosting::new(|payload| {
            if is_rate_limit_probe(payload) {
                return Ok(plenty_of_quota());
            }
            Ok(json!({
                "data": { "repository": null },
                "errors": [{ "type": "NOT_FOUND", "message": "Could not resolve to a Repository with the name 'acme/ghost'." }]
            }))
        }));
        let bots = BotFilter::default();
        let fetcher = ReviewFetcher::new(&executor, &bots, "acme");

        let err = fetcher
            .fetch_repository("ghost", &FetchMode::MaxPullRequests(5), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, HostingError::NotResolved(_)));
    }

    #[tokio::test]
    async fn zero_cap_makes_no_requests() {
        let executor = QueryExecutor::new(FnHosting::new(|_| panic!("no query expected")));
        let bots = BotFilter::default();
        let fetcher = ReviewFetcher::new(&executor, &bots, "acme");

        let result = fetcher
            .fetch_repository("api", &FetchMode::MaxPullRequests(0), |_| {})
            .await
            .unwrap();

        assert_eq!(result.pull_requests_processed, 0);
    }
}
