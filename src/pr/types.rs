use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single open pull request as seen by the chain graph.
///
/// Only `number`, `base` and `head` take part in building chains; the
/// remaining fields feed the filter predicate and the renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number (e.g., 42)
    pub number: u64,
    /// Branch this PR merges into
    pub base: String,
    /// Branch this PR is built from
    pub head: String,
    /// PR title
    pub title: String,
    /// Author's GitHub login
    pub author: String,
    /// Login of the first approving reviewer, if any
    pub approved_by: Option<String>,
    /// Whether any review requested changes
    #[serde(default)]
    pub has_changes_requested: bool,
    /// Whether the PR has any comments
    #[serde(default)]
    pub has_comments: bool,
    /// Label names
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Logins of requested reviewers
    #[serde(default)]
    pub reviewers: BTreeSet<String>,
    /// Whether the PR is a draft
    #[serde(default)]
    pub is_draft: bool,
    /// When the PR was opened
    pub created_at: DateTime<Utc>,
    /// Total lines added
    #[serde(default)]
    pub additions: u64,
    /// Total lines deleted
    #[serde(default)]
    pub deletions: u64,
}

impl PullRequest {
    pub fn is_approved(&self) -> bool {
        self.approved_by.as_deref().is_some_and(|login| !login.is_empty())
    }

    /// Combined added + deleted lines.
    pub fn change_size(&self) -> u64 {
        self.additions + self.deletions
    }
}

/// Everything fetched for one repository in a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Web URL of the repository (e.g., https://github.com/org/repo)
    pub url: String,
    /// Name of the default branch, the root of every chain
    pub default_branch: String,
    /// Open pull requests in the order the API returned them
    pub pull_requests: Vec<PullRequest>,
}

impl Repository {
    /// Web URL of a single PR in this repository.
    pub fn pr_url(&self, number: u64) -> String {
        format!("{}/pull/{}", self.url.trim_end_matches('/'), number)
    }
}

/// Owner/name pair identifying a repository on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
