use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pull request as reported by GraphQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
    #[serde(other)]
    Unknown,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "OPEN",
            PrState::Closed => "CLOSED",
            PrState::Merged => "MERGED",
            PrState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reviewer's overall disposition on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Unknown,
}

impl ReviewState {
    /// Dismissed and pending verdicts are never counted.
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            ReviewState::Approved | ReviewState::ChangesRequested | ReviewState::Commented
        )
    }
}

/// Pull-request context embedded in every comment detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRef {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
    pub state: PrState,
}

/// One line-level review comment that survived bot and self-review filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCommentDetail {
    pub reviewer: String,
    pub body: String,
    #[serde(default)]
    pub diff_hunk: String,
    pub created_at: DateTime<Utc>,
    pub pr: PullRequestRef,
}

/// Accumulated review activity for one contributor.
///
/// Counters only ever grow; `reviews_given` includes COMMENTED verdicts,
/// which are not tracked separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActivity {
    pub login: String,
    pub total_activity: u64,
    pub reviews_given: u64,
    pub approvals: u64,
    pub changes_requested: u64,
    pub review_comments: u64,
    pub repos_active_in: IndexSet<String>,
}

impl UserActivity {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            total_activity: 0,
            reviews_given: 0,
            approvals: 0,
            changes_requested: 0,
            review_comments: 0,
            repos_active_in: IndexSet::new(),
        }
    }

    /// Records a counted verdict. Verdicts never touch `total_activity`.
    pub fn record_verdict(&mut self, state: ReviewState, repo: &str) {
        self.reviews_given += 1;
        match state {
            ReviewState::Approved => self.approvals += 1,
            ReviewState::ChangesRequested => self.changes_requested += 1,
            _ => {}
        }
        self.repos_active_in.insert(repo.to_string());
    }

    pub fn record_comment(&mut self, repo: &str) {
        self.review_comments += 1;
        self.total_activity += 1;
        self.repos_active_in.insert(repo.to_string());
    }

    /// Sums counters and unions repository sets.
    pub fn absorb(&mut self, other: &UserActivity) {
        self.total_activity += other.total_activity;
        self.reviews_given += other.reviews_given;
        self.approvals += other.approvals;
        self.changes_requested += other.changes_requested;
        self.review_comments += other.review_comments;
        self.repos_active_in
            .extend(other.repos_active_in.iter().cloned());
    }
}

/// Activity keyed by login, in first-sighting order.
pub type ActivityMap = IndexMap<String, UserActivity>;

/// Everything the fetcher learned about one repository.
#[derive(Debug, Clone, Default)]
pub struct RepoActivity {
    pub repo: String,
    pub activity: ActivityMap,
    pub details: Vec<ReviewCommentDetail>,
    pub pull_requests_processed: usize,
}

impl RepoActivity {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }

    pub fn user_mut(&mut self, login: &str) -> &mut UserActivity {
        self.activity
            .entry(login.to_string())
            .or_insert_with(|| UserActivity::new(login))
    }
}

/// Remaining GraphQL quota and when it refills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// How far back a repository walk reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Pull requests updated at or after the boundary.
    Since(DateTime<Utc>),
    /// The most recently updated N pull requests per repository.
    MaxPullRequests(usize),
}

impl FetchMode {
    /// Whether an individual verdict or comment falls inside the window.
    /// Max-count mode applies no timestamp filtering.
    pub fn admits(&self, created_at: DateTime<Utc>) -> bool {
        match self {
            FetchMode::Since(boundary) => created_at >= *boundary,
            FetchMode::MaxPullRequests(_) => true,
        }
    }

    /// Whether the walk must stop before the next pull request.
    pub fn stops_before(&self, updated_at: DateTime<Utc>, processed: usize) -> bool {
        match self {
            FetchMode::Since(boundary) => updated_at < *boundary,
            FetchMode::MaxPullRequests(cap) => processed >= *cap,
        }
    }

    /// Whether the cap has been reached after processing a page.
    pub fn exhausted(&self, processed: usize) -> bool {
        matches!(self, FetchMode::MaxPullRequests(cap) if processed >= *cap)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn verdicts_do_not_raise_total_activity() {
        let mut user = UserActivity::new("alice");
        user.record_verdict(ReviewState::Approved, "api");
        user.record_verdict(ReviewState::Commented, "api");
        user.record_verdict(ReviewState::ChangesRequested, "web");

        assert_eq!(user.reviews_given, 3);
        assert_eq!(user.approvals, 1);
        assert_eq!(user.changes_requested, 1);
        assert_eq!(user.total_activity, 0);
        assert_eq!(user.repos_active_in.len(), 2);
    }

    #[test]
    fn absorb_sums_counters_and_unions_repos() {
        let mut a = UserActivity::new("alice");
        a.record_comment("api");
        let mut b = UserActivity::new("alice");
        b.record_comment("web");
        b.record_comment("api");
        b.record_verdict(ReviewState::Approved, "web");

        a.absorb(&b);

        assert_eq!(a.total_activity, 3);
        assert_eq!(a.review_comments, 3);
        assert_eq!(a.approvals, 1);
        assert_eq!(
            a.repos_active_in.iter().collect::<Vec<_>>(),
            vec!["api", "web"]
        );
    }

    #[test]
    fn since_mode_boundary_is_inclusive() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mode = FetchMode::Since(t);

        assert!(mode.admits(t));
        assert!(!mode.admits(t - Duration::seconds(1)));
        assert!(!mode.stops_before(t, 0));
        assert!(mode.stops_before(t - Duration::seconds(1), 0));
    }

    #[test]
    fn max_mode_ignores_timestamps() {
        let old = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let mode = FetchMode::MaxPullRequests(2);

        assert!(mode.admits(old));
        assert!(!mode.stops_before(old, 1));
        assert!(mode.stops_before(old, 2));
        assert!(mode.exhausted(2));
        assert!(!FetchMode::Since(old).exhausted(1000));
    }

    #[test]
    fn review_state_parses_graphql_values() {
        let state: ReviewState = serde_json::from_str("\"CHANGES_REQUESTED\"").unwrap();
        assert_eq!(state, ReviewState::ChangesRequested);
        let unknown: ReviewState = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(unknown, ReviewState::Unknown);
        assert!(!ReviewState::Dismissed.is_counted());
        assert!(!ReviewState::Pending.is_counted());
    }
}
