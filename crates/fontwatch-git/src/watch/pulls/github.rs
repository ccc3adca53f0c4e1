//! GitHub GraphQL pull request listing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Mergeable, PullRequest, PullRequestPage, PullRequestProvider};
use crate::error::GitError;
use crate::repository::Oid;

pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

const PAGE_SIZE: u32 = 50;

const OPEN_PULL_REQUESTS: &str = r#"
query($owner: String!, $name: String!, $base: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(states: OPEN, baseRefName: $base, first: $first, after: $after,
                 orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        url
        createdAt
        mergeable
        headRefName
        headRefOid
        headRepository { url }
      }
    }
  }
}"#;

/// Lists open pull requests of one GitHub repository.
#[derive(Debug, Clone)]
pub struct GithubClient {
    owner: String,
    name: String,
    token: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl GithubClient {
    /// Creates a client for `owner/name`.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            token: None,
            endpoint: GITHUB_GRAPHQL_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Creates a client from a `https://github.com/<owner>/<name>(.git)` url.
    pub fn from_url(url: &str) -> Result<Self, GitError> {
        let path = url
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .strip_prefix("https://github.com/")
            .ok_or_else(|| GitError::provider(format!("not a GitHub repository url: {}", url)))?;
        match path.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            },
            _ => Err(GitError::provider(format!("not a GitHub repository url: {}", url))),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl PullRequestProvider for GithubClient {
    async fn open_pull_requests(
        &self,
        base_branch: &str,
        after: Option<String>,
    ) -> Result<PullRequestPage, GitError> {
        let body = json!({
            "query": OPEN_PULL_REQUESTS,
            "variables": {
                "owner": self.owner,
                "name": self.name,
                "base": base_branch,
                "first": PAGE_SIZE,
                "after": after,
            },
        });

        debug!(repository = %format!("{}/{}", self.owner, self.name), cursor = ?after, "listing pull requests");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::USER_AGENT, "fontwatch")
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitError::provider(format!("GitHub request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GitError::provider(format!("GitHub responded with {}", status)));
        }

        let response: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| GitError::provider(format!("Invalid GitHub response: {}", e)))?;
        response.into_page()
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_requests: PullRequestConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestConnection {
    page_info: PageInfo,
    nodes: Vec<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    number: u64,
    url: String,
    created_at: DateTime<Utc>,
    mergeable: Mergeable,
    head_ref_name: String,
    head_ref_oid: String,
    head_repository: Option<HeadRepository>,
}

#[derive(Debug, Deserialize)]
struct HeadRepository {
    url: String,
}

impl GraphqlResponse {
    fn into_page(self) -> Result<PullRequestPage, GitError> {
        if let Some(error) = self.errors.first() {
            return Err(GitError::provider(format!("GitHub GraphQL error: {}", error.message)));
        }
        let connection = self
            .data
            .and_then(|data| data.repository)
            .ok_or_else(|| GitError::provider("repository not found"))?
            .pull_requests;

        let pull_requests = connection
            .nodes
            .into_iter()
            .map(|node| PullRequest {
                number: node.number,
                url: node.url,
                created_at: node.created_at,
                mergeable: node.mergeable,
                head_ref: node.head_ref_name,
                head_commit: Oid::new(node.head_ref_oid),
                head_repository_url: node.head_repository.map(|repo| repo.url),
            })
            .collect();

        let next_cursor = if connection.page_info.has_next_page {
            connection.page_info.end_cursor
        } else {
            None
        };

        Ok(PullRequestPage {
            pull_requests,
            next_cursor,
        })
    }
}
