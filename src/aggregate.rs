use std::collections::HashSet;

use indexmap::IndexMap;

use crate::types::{ActivityMap, RepoActivity, ReviewCommentDetail, UserActivity};

/// Merges per-repository activity into one list ranked by `total_activity`.
///
/// Logins keep first-encounter order among equal scores (the sort is
/// stable). Inputs are left untouched.
pub fn aggregate_activity<'a, I>(maps: I) -> Vec<UserActivity>
where
    I: IntoIterator<Item = &'a ActivityMap>,
{
    let mut merged: IndexMap<String, UserActivity> = IndexMap::new();

    for map in maps {
        for (login, activity) in map {
            merged
                .entry(login.clone())
                .or_insert_with(|| UserActivity::new(login.clone()))
                .absorb(activity);
        }
    }

    let mut ranked: Vec<UserActivity> = merged.into_values().collect();
    ranked.sort_by(|a, b| b.total_activity.cmp(&a.total_activity));
    ranked
}

/// The first `n` entries of an already-ranked list.
pub fn top_n(ranked: &[UserActivity], n: usize) -> &[UserActivity] {
    &ranked[..n.min(ranked.len())]
}

/// Concatenates comment details across repositories, preserving order.
pub fn flatten_details(repos: &[RepoActivity]) -> Vec<ReviewCommentDetail> {
    repos
        .iter()
        .flat_map(|repo| repo.details.iter().cloned())
        .collect()
}

/// Keeps only comments written by the given contributors.
pub fn retain_contributors(
    details: Vec<ReviewCommentDetail>,
    contributors: &[UserActivity],
) -> Vec<ReviewCommentDetail> {
    let logins: HashSet<&str> = contributors.iter().map(|u| u.login.as_str()).collect();
    details
        .into_iter()
        .filter(|detail| logins.contains(detail.reviewer.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{PrState, PullRequestRef};

    fn repo_with_comments(repo: &str, comments: &[&str]) -> RepoActivity {
        let mut acc = RepoActivity::new(repo);
        for (i, login) in comments.iter().enumerate() {
            acc.user_mut(login).record_comment(repo);
            acc.details.push(ReviewCommentDetail {
                reviewer: login.to_string(),
                body: format!("comment {i}"),
                diff_hunk: String::new(),
                created_at: Utc::now(),
                pr: PullRequestRef {
                    repo: repo.to_string(),
                    number: 1,
                    title: "Change".to_string(),
                    author: "carol".to_string(),
                    url: format!("https://github.com/acme/{repo}/pull/1"),
                    state: PrState::Open,
                },
            });
        }
        acc
    }

    #[test]
    fn two_repository_scenario() {
        let a = repo_with_comments("A", &["alice", "alice"]);
        let b = repo_with_comments("B", &["alice", "bob"]);

        let ranked = aggregate_activity([&a.activity, &b.activity]);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].login, "alice");
        assert_eq!(ranked[0].total_activity, 3);
        assert_eq!(
            ranked[0].repos_active_in.iter().collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(ranked[1].login, "bob");
        assert_eq!(ranked[1].total_activity, 1);
        assert_eq!(
            ranked[1].repos_active_in.iter().collect::<Vec<_>>(),
            vec!["B"]
        );

        let top = top_n(&ranked, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].login, "alice");
    }

    #[test]
    fn counters_are_conserved_and_sorted() {
        let repos = [
            repo_with_comments("A", &["dave", "erin", "erin", "frank"]),
            repo_with_comments("B", &["frank", "frank", "frank", "dave"]),
            repo_with_comments("C", &["erin"]),
        ];

        let ranked = aggregate_activity(repos.iter().map(|r| &r.activity));

        let input_total: u64 = repos
            .iter()
            .flat_map(|r| r.activity.values())
            .map(|u| u.total_activity)
            .sum();
        let merged_total: u64 = ranked.iter().map(|u| u.total_activity).sum();
        assert_eq!(input_total, merged_total);
        assert!(
            ranked
                .windows(2)
                .all(|w| w[0].total_activity >= w[1].total_activity)
        );
    }

    #[test]
    fn ties_keep_encounter_order() {
        let a = repo_with_comments("A", &["zed", "amy"]);

        let ranked = aggregate_activity([&a.activity]);

        assert_eq!(ranked[0].login, "zed");
        assert_eq!(ranked[1].login, "amy");
    }

    #[test]
    fn sources_are_not_mutated() {
        let a = repo_with_comments("A", &["alice"]);
        let b = repo_with_comments("B", &["alice"]);
        let before = a.activity.clone();

        let _ = aggregate_activity([&a.activity, &b.activity]);

        assert_eq!(a.activity, before);
    }

    #[test]
    fn top_n_is_bounded_prefix() {
        let a = repo_with_comments("A", &["x", "x", "y"]);
        let ranked = aggregate_activity([&a.activity]);

        assert_eq!(top_n(&ranked, 0).len(), 0);
        assert_eq!(top_n(&ranked, 5).len(), 2);
        assert_eq!(top_n(&ranked, 1), &ranked[..1]);
    }

    #[test]
    fn details_flatten_in_repository_order_and_filter_to_top() {
        let repos = vec![
            repo_with_comments("A", &["alice", "bob"]),
            repo_with_comments("B", &["carl", "alice"]),
        ];
        let ranked = aggregate_activity(repos.iter().map(|r| &r.activity));

        let flat = flatten_details(&repos);
        assert_eq!(
            flat.iter().map(|d| d.reviewer.as_str()).collect::<Vec<_>>(),
            vec!["alice", "bob", "carl", "alice"]
        );

        let kept = retain_contributors(flat, top_n(&ranked, 1));
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|d| d.reviewer == "alice"));
    }
}
