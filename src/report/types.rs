use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pr::{PullRequest, Repository};

/// A pull request as emitted in JSON output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPullRequest {
    pub number: u64,
    pub base: String,
    pub head: String,
    pub title: String,
    pub author: String,
    /// Empty when not approved
    pub approved_by: String,
    pub has_changes_requested: bool,
    pub has_comments: bool,
    pub labels: Vec<String>,
    pub is_draft: bool,
    pub created_at: DateTime<Utc>,
    pub reviewers: Vec<String>,
    pub additions: u64,
    pub deletions: u64,
    pub url: String,
}

impl JsonPullRequest {
    pub fn new(pr: &PullRequest, repository: &Repository) -> Self {
        Self {
            number: pr.number,
            base: pr.base.clone(),
            head: pr.head.clone(),
            title: pr.title.clone(),
            author: pr.author.clone(),
            approved_by: pr.approved_by.clone().unwrap_or_default(),
            has_changes_requested: pr.has_changes_requested,
            has_comments: pr.has_comments,
            labels: pr.labels.iter().cloned().collect(),
            is_draft: pr.is_draft,
            created_at: pr.created_at,
            reviewers: pr.reviewers.iter().cloned().collect(),
            additions: pr.additions,
            deletions: pr.deletions,
            url: repository.pr_url(pr.number),
        }
    }
}

/// A PR and the chains built on top of it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonChain {
    pub pull_request: JsonPullRequest,
    pub children: Vec<JsonChain>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JsonOutput {
    pub chains: Vec<JsonChain>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JsonRebaseOutput {
    pub script: String,
    pub commands: Vec<String>,
}
