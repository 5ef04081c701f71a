//! GraphQL documents and the typed shapes of their responses.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{PrState, PullRequestRef, RateLimit, ReviewState};

pub const ACCESS_QUERY: &str = r#"
    query($org: String!) {
        viewer { login }
        organization(login: $org) { login }
        rateLimit { remaining resetAt }
    }
"#;

pub const RATE_LIMIT_QUERY: &str = r#"
    query {
        rateLimit { remaining resetAt }
    }
"#;

pub const REPOSITORIES_QUERY: &str = r#"
    query($org: String!, $after: String) {
        organization(login: $org) {
            repositories(first: 100, after: $after, isArchived: false, orderBy: {field: NAME, direction: ASC}) {
                nodes { name }
                pageInfo { hasNextPage endCursor }
            }
        }
        rateLimit { remaining resetAt }
    }
"#;

pub const PULL_REQUESTS_QUERY: &str = r#"
    query($owner: String!, $repo: String!, $after: String) {
        repository(owner: $owner, name: $repo) {
            pullRequests(first: 20, after: $after, orderBy: {field: UPDATED_AT, direction: DESC}) {
                nodes {
                    number
                    title
                    url
                    state
                    updatedAt
                    author { login __typename }
                    reviews(first: 100) {
                        nodes {
                            author { login __typename }
                            state
                            createdAt
                        }
                    }
                    reviewThreads(first: 100) {
                        nodes {
                            comments(first: 50) {
                                nodes {
                                    author { login __typename }
                                    body
                                    diffHunk
                                    createdAt
                                }
                            }
                        }
                    }
                }
                pageInfo { hasNextPage endCursor }
            }
        }
        rateLimit { remaining resetAt }
    }
"#;

/// Envelope every GraphQL response arrives in.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Next cursor, or `None` when the walk is over.
    pub fn next_cursor(self) -> Option<String> {
        if self.has_next_page {
            self.end_cursor
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Connection<T> {
    pub nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedConnection<T> {
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessData {
    pub viewer: Login,
    pub organization: Option<Login>,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitData {
    pub rate_limit: RateLimit,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesData {
    pub organization: Option<OrganizationRepositories>,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationRepositories {
    pub repositories: PagedConnection<RepositoryName>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryName {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestsData {
    pub repository: Option<RepositoryPullRequests>,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPullRequests {
    pub pull_requests: PagedConnection<PullRequestNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    pub login: String,
    #[serde(rename = "__typename")]
    pub typename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestNode {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: PrState,
    pub updated_at: DateTime<Utc>,
    pub author: Option<Actor>,
    pub reviews: Connection<ReviewNode>,
    pub review_threads: Connection<ReviewThreadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewNode {
    pub author: Option<Actor>,
    pub state: ReviewState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewThreadNode {
    pub comments: Connection<ReviewCommentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCommentNode {
    pub author: Option<Actor>,
    pub body: String,
    pub diff_hunk: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PullRequestNode {
    /// Author login; deleted accounts show up as `ghost`.
    pub fn author_login(&self) -> &str {
        self.author.as_ref().map_or("ghost", |a| a.login.as_str())
    }

    pub fn to_ref(&self, repo: &str) -> PullRequestRef {
        PullRequestRef {
            repo: repo.to_string(),
            number: self.number,
            title: self.title.clone(),
            author: self.author_login().to_string(),
            url: self.url.clone(),
            state: self.state,
        }
    }
}
