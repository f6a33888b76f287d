pub mod cache;
pub mod types;

pub use cache::CachedSource;
pub use types::{PullRequest, RepoRef, Repository};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;

/// GitHub caps `first` at 100 per connection page.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub API returned errors: {0}")]
    GraphQl(String),

    #[error("Repository {0} not found or not accessible")]
    RepositoryNotFound(String),

    #[error("Invalid repository '{0}' (expected owner/name)")]
    InvalidRepo(String),

    #[error("Unable to read the origin remote: {0}")]
    NoRemote(String),

    #[error("GitHub token not found (set CHAINLINK_TOKEN or GITHUB_TOKEN)")]
    MissingToken,
}

/// Where the open pull requests of a repository come from.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Fetch the repository metadata and all of its open PRs, in API order.
    async fn fetch_repository(&self, repo: &RepoRef) -> Result<Repository, PrError>;
}

/// Parse an `owner/name` argument.
pub fn parse_repo_ref(input: &str) -> Result<RepoRef, PrError> {
    let segments: Vec<&str> = input.trim().split('/').collect();
    match segments.as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(RepoRef {
            owner: owner.to_string(),
            repo: repo.trim_end_matches(".git").to_string(),
        }),
        _ => Err(PrError::InvalidRepo(input.to_string())),
    }
}

/// Parse a git remote URL: `git@host:owner/repo.git`,
/// `ssh://git@host/owner/repo.git` or `https://host/owner/repo.git`.
pub fn parse_remote_url(url: &str) -> Result<RepoRef, PrError> {
    let url = url.trim();
    let invalid = || PrError::InvalidRepo(url.to_string());

    if let Some(rest) = url.strip_prefix("git@") {
        let (_host, path) = rest.split_once(':').ok_or_else(invalid)?;
        return parse_repo_ref(path).map_err(|_| invalid());
    }

    let parsed = reqwest::Url::parse(url).map_err(|_| invalid())?;
    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.len() != 2 {
        return Err(invalid());
    }
    parse_repo_ref(&segments.join("/")).map_err(|_| invalid())
}

/// Repository from `--repo`, else from the `origin` remote of the
/// repository in the current directory.
pub fn resolve_repo(arg: Option<&str>) -> Result<RepoRef, PrError> {
    if let Some(repo) = arg {
        return parse_repo_ref(repo);
    }

    let output = Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .output()
        .map_err(|e| PrError::NoRemote(e.to_string()))?;
    if !output.status.success() {
        return Err(PrError::NoRemote(
            "no origin remote configured, pass --repo owner/name".to_string(),
        ));
    }
    let url = String::from_utf8_lossy(&output.stdout);
    debug!(url = %url.trim(), "read origin remote");
    parse_remote_url(&url)
}

const PULL_REQUESTS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    url
    defaultBranchRef { name }
    pullRequests(first: $first, after: $after, states: OPEN, orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        isDraft
        createdAt
        additions
        deletions
        headRefName
        baseRefName
        author { login }
        approvals: reviews(first: 1, states: APPROVED) { nodes { author { login } } }
        changesRequested: reviews(states: CHANGES_REQUESTED) { totalCount }
        comments { totalCount }
        labels(first: 20) { nodes { name } }
        reviewRequests(first: 20) {
          nodes { requestedReviewer { ... on User { login } ... on Team { name } } }
        }
      }
    }
  }
}
"#;

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<RepositoryData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct RepositoryData {
    repository: Option<RepositoryNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    url: String,
    default_branch_ref: Option<BranchRef>,
    pull_requests: PullRequestConnection,
}

#[derive(Deserialize)]
struct BranchRef {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<PullRequestNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    number: u64,
    title: String,
    #[serde(default)]
    is_draft: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    head_ref_name: String,
    base_ref_name: String,
    author: Option<Actor>,
    approvals: Nodes<Review>,
    changes_requested: Count,
    comments: Count,
    labels: Nodes<Label>,
    review_requests: Nodes<ReviewRequest>,
}

#[derive(Deserialize)]
struct Actor {
    login: String,
}

#[derive(Deserialize)]
struct Review {
    author: Option<Actor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Count {
    total_count: u64,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Nodes<T> {
    #[serde(default)]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    requested_reviewer: Option<Reviewer>,
}

#[derive(Deserialize)]
struct Reviewer {
    login: Option<String>,
    name: Option<String>,
}

impl From<PullRequestNode> for PullRequest {
    fn from(node: PullRequestNode) -> Self {
        Self {
            number: node.number,
            base: node.base_ref_name,
            head: node.head_ref_name,
            title: node.title,
            author: node.author.map(|a| a.login).unwrap_or_default(),
            approved_by: node
                .approvals
                .nodes
                .into_iter()
                .find_map(|review| review.author.map(|a| a.login)),
            has_changes_requested: node.changes_requested.total_count > 0,
            has_comments: node.comments.total_count > 0,
            labels: node.labels.nodes.into_iter().map(|l| l.name).collect(),
            reviewers: node
                .review_requests
                .nodes
                .into_iter()
                .filter_map(|r| r.requested_reviewer)
                .filter_map(|r| r.login.or(r.name))
                .collect(),
            is_draft: node.is_draft,
            created_at: node.created_at,
            additions: node.additions,
            deletions: node.deletions,
        }
    }
}

/// Fetches open PRs through the GitHub GraphQL API.
pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    max_prs: usize,
}

impl GitHubSource {
    /// Source authenticated with the token resolved from `config`.
    pub fn new(config: &Config) -> Result<Self, PrError> {
        Self::with_token(config, config.github_token())
    }

    /// A missing token is only reported once a request is needed, so a
    /// cached snapshot stays usable without one.
    pub fn with_token(config: &Config, token: Option<String>) -> Result<Self, PrError> {
        let client = reqwest::Client::builder().user_agent("chainlink").build()?;
        Ok(Self {
            client,
            api_url: config.api_url().to_string(),
            token,
            max_prs: config.max_prs(),
        })
    }

    async fn fetch_page(
        &self,
        repo: &RepoRef,
        first: usize,
        after: Option<&str>,
    ) -> Result<RepositoryNode, PrError> {
        let token = self.token.as_deref().ok_or(PrError::MissingToken)?;
        let body = json!({
            "query": PULL_REQUESTS_QUERY,
            "variables": {
                "owner": repo.owner,
                "repo": repo.repo,
                "first": first,
                "after": after,
            },
        });

        let response: GraphQlResponse = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(PrError::GraphQl(messages.join("; ")));
        }

        response
            .data
            .and_then(|data| data.repository)
            .ok_or_else(|| PrError::RepositoryNotFound(repo.to_string()))
    }
}

#[async_trait]
impl PullRequestSource for GitHubSource {
    #[instrument(skip(self), fields(repo = %repo))]
    async fn fetch_repository(&self, repo: &RepoRef) -> Result<Repository, PrError> {
        info!("fetching pull requests from GitHub");
        let mut pull_requests: Vec<PullRequest> = Vec::new();
        let mut cursor: Option<String> = None;

        let (url, default_branch) = loop {
            let first = PAGE_SIZE.min(self.max_prs.saturating_sub(pull_requests.len()));
            let page = self.fetch_page(repo, first, cursor.as_deref()).await?;
            debug!(received = page.pull_requests.nodes.len(), "received page");
            pull_requests.extend(page.pull_requests.nodes.into_iter().map(PullRequest::from));

            let info = page.pull_requests.page_info;
            let limit_reached = pull_requests.len() >= self.max_prs;
            if info.has_next_page && limit_reached {
                warn!(
                    max_prs = self.max_prs,
                    "more open PRs than the fetch limit, chains may be incomplete"
                );
            }
            match info.end_cursor {
                Some(next) if info.has_next_page && !limit_reached => cursor = Some(next),
                _ => break (page.url, page.default_branch_ref),
            }
        };

        let default_branch = default_branch
            .map(|branch| branch.name)
            .ok_or_else(|| PrError::RepositoryNotFound(format!("{repo} (no default branch)")))?;

        info!(prs = pull_requests.len(), default_branch = %default_branch, "fetched pull requests");
        Ok(Repository {
            url,
            default_branch,
            pull_requests,
        })
    }
}
