use serde_json::json;
use tracing::{debug, info};

use crate::{
    error::HostingError,
    github::Hosting,
    graphql::{ACCESS_QUERY, AccessData, REPOSITORIES_QUERY, RepositoriesData},
    query::QueryExecutor,
};

/// Confirms the token works and the organization is visible before any
/// long-running fetch starts. Returns the authenticated login.
pub async fn verify_access<H: Hosting + Sync>(
    executor: &QueryExecutor<H>,
    org: &str,
) -> Result<String, HostingError> {
    let data: AccessData = match executor.execute(ACCESS_QUERY, json!({ "org": org })).await {
        Ok(data) => data,
        Err(HostingError::OrganizationNotFound(_)) => {
            return Err(HostingError::OrganizationNotFound(org.to_string()));
        }
        Err(err) => return Err(err),
    };

    if data.organization.is_none() {
        return Err(HostingError::OrganizationNotFound(org.to_string()));
    }
    if let Some(rate_limit) = &data.rate_limit {
        debug!(remaining = rate_limit.remaining, "Initial GitHub quota");
    }
    info!(viewer = %data.viewer.login, org, "GitHub access verified");
    Ok(data.viewer.login)
}

/// Resolves the repositories to scan.
///
/// An explicit list is returned verbatim; missing repositories surface
/// later, during the fetch. Otherwise every non-archived repository of the
/// organization is listed in discovery order.
pub async fn list_repositories<H: Hosting + Sync>(
    executor: &QueryExecutor<H>,
    org: &str,
    explicit: Option<&[String]>,
) -> Result<Vec<String>, HostingError> {
    if let Some(names) = explicit {
        return Ok(names.to_vec());
    }

    executor.ensure_quota().await?;

    let mut names = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let data: RepositoriesData = executor
            .execute(REPOSITORIES_QUERY, json!({ "org": org, "after": after }))
            .await?;
        let organization = data
            .organization
            .ok_or_else(|| HostingError::OrganizationNotFound(org.to_string()))?;
        let connection = organization.repositories;

        names.extend(connection.nodes.into_iter().map(|node| node.name));
        after = connection.page_info.next_cursor();

        debug!(found = names.len(), org, "Listed repositories page");

        if after.is_none() {
            break;
        }
        if let Some(rate_limit) = &data.rate_limit {
            executor.throttle(rate_limit).await;
        }
    }

    info!(count = names.len(), org, "Discovered repositories");
    Ok(names)
}
