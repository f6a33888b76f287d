//! `log`, `open` and `rebase` over one fetched repository snapshot.
//!
//! Each command writes its user-facing output to `out` and reports which
//! of the "nothing found" states it ended in, if any.

use chrono::{DateTime, Utc};
use std::io::Write;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::chain::{ChainGraph, ChainTarget, ROOT};
use crate::filter::PrFilter;
use crate::pr::{PullRequest, Repository};
use crate::rebase::{RebaseError, RebaseOptions, RebasePlan};
use crate::report::{self, JsonOutput, JsonRebaseOutput, ListFormat, LogFormat, ReportError, ScriptFormat};

pub const NO_CHAINS: &str = "No PR chains";
pub const NO_CHAIN_FOR_TARGET: &str = "No PR chain found with filter";
pub const NO_MATCHING_PRS: &str = "No PRs matching the filters";
pub const NO_MATCHING_CHAIN: &str = "No PR chain found matching the filters";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Rebase(#[from] RebaseError),

    #[error("Unable to open {url}: {source}")]
    Open {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self::Report(ReportError::Write(e))
    }
}

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The repository has no (stacked) PRs at all
    NoChains,
    /// The branch or number argument matched no PR
    NoChainForTarget,
    /// PRs exist but the filter predicate rejected all of them
    NoMatches,
}

#[derive(Debug, Clone)]
pub struct LogRequest {
    /// Only show the chain through this branch or PR number
    pub target: Option<String>,
    /// Include PRs that are not part of a stack
    pub all: bool,
    pub format: LogFormat,
    pub filter: PrFilter,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub target: String,
    /// Print the URLs instead of opening them
    pub print: bool,
    pub format: ListFormat,
    pub filter: PrFilter,
}

#[derive(Debug, Clone)]
pub struct RebaseRequest {
    pub target: String,
    pub options: RebaseOptions,
    /// Execute the script instead of printing it
    pub run: bool,
    pub shell: String,
    pub format: ScriptFormat,
}

fn resolve_chain(graph: &ChainGraph, target: &str) -> Vec<u64> {
    match ChainTarget::parse(target) {
        Some(target) => graph.extract_chain(&target),
        None => Vec::new(),
    }
}

/// Print the forest of chains (or the chain through `request.target`).
#[instrument(skip_all, fields(target = ?request.target, all = request.all))]
pub fn log(
    repository: &Repository,
    request: &LogRequest,
    out: &mut dyn Write,
) -> Result<Outcome, CommandError> {
    let json = request.format == LogFormat::Json;
    let graph = ChainGraph::build(&repository.default_branch, &repository.pull_requests);
    if graph.is_empty() {
        return empty(out, json, Outcome::NoChains, NO_CHAINS);
    }

    let relations = match &request.target {
        Some(target) => {
            let Some(position) =
                ChainTarget::parse(target).and_then(|t| graph.resolve_target(&t))
            else {
                return empty(out, json, Outcome::NoChainForTarget, NO_CHAIN_FOR_TARGET);
            };
            let chain = graph.relations().chain_positions(position);
            graph.relations().restrict_to(&chain)
        }
        None if request.all => graph.relations().clone(),
        None => graph.relations().prune_singletons(),
    };

    if relations.following(ROOT).is_empty() {
        return empty(out, json, Outcome::NoChains, NO_CHAINS);
    }

    if json {
        let output = report::json_forest(repository, &graph, &relations, &request.filter);
        let outcome = if output.chains.is_empty() {
            Outcome::NoMatches
        } else {
            Outcome::Done
        };
        report::write_json(out, &output)?;
        return Ok(outcome);
    }

    let lines = report::visible_forest(&graph, &relations, &request.filter);
    if lines.is_empty() {
        writeln!(out, "{NO_MATCHING_PRS}")?;
        return Ok(Outcome::NoMatches);
    }
    debug!(lines = lines.len(), "rendering forest");
    for line in report::render_forest(repository, &graph, &lines, request.format, request.now) {
        writeln!(out, "{line}")?;
    }
    Ok(Outcome::Done)
}

/// Open (or print) the URL of every PR in the chain through `request.target`.
#[instrument(skip_all, fields(target = %request.target))]
pub fn open(
    repository: &Repository,
    request: &OpenRequest,
    out: &mut dyn Write,
    opener: &mut dyn FnMut(&str) -> std::io::Result<()>,
) -> Result<Outcome, CommandError> {
    let json = request.format == ListFormat::Json;
    let graph = ChainGraph::build(&repository.default_branch, &repository.pull_requests);

    let chain = resolve_chain(&graph, &request.target);
    if chain.is_empty() {
        return empty(out, json, Outcome::NoChainForTarget, NO_CHAIN_FOR_TARGET);
    }

    let prs: Vec<&PullRequest> = chain
        .iter()
        .filter_map(|&number| graph.pr(number))
        .filter(|pr| request.filter.matches(pr))
        .collect();
    if prs.is_empty() {
        return empty(out, json, Outcome::NoMatches, NO_MATCHING_CHAIN);
    }

    if json {
        report::write_json(out, &report::json_flat(repository, &prs))?;
        return Ok(Outcome::Done);
    }

    for pr in prs {
        let url = repository.pr_url(pr.number);
        if request.print {
            writeln!(out, "{url}")?;
        } else {
            writeln!(out, "Opening {url}")?;
            opener(&url).map_err(|source| CommandError::Open {
                url: url.clone(),
                source,
            })?;
        }
    }
    Ok(Outcome::Done)
}

/// Print, or run, the rebase script for the chain through `request.target`.
#[instrument(skip_all, fields(target = %request.target, run = request.run))]
pub fn rebase(
    repository: &Repository,
    request: &RebaseRequest,
    out: &mut dyn Write,
) -> Result<Outcome, CommandError> {
    let json = request.format == ScriptFormat::Json;
    let graph = ChainGraph::build(&repository.default_branch, &repository.pull_requests);

    let chain = resolve_chain(&graph, &request.target);
    let plan = match RebasePlan::for_chain(&graph, &chain, &request.options) {
        Ok(plan) => plan,
        Err(RebaseError::NoChain) => {
            if json {
                report::write_json(out, &JsonRebaseOutput::default())?;
            } else {
                writeln!(out, "{NO_CHAIN_FOR_TARGET}")?;
            }
            return Ok(Outcome::NoChainForTarget);
        }
        Err(e) => return Err(e.into()),
    };
    info!(prs = chain.len(), "generated rebase plan");

    if json {
        let output = JsonRebaseOutput {
            script: plan.script(),
            commands: plan.commands(),
        };
        report::write_json(out, &output)?;
        return Ok(Outcome::Done);
    }

    if request.run {
        out.flush()?;
        plan.execute(&request.shell)?;
        return Ok(Outcome::Done);
    }

    writeln!(out, "{}", plan.script())?;
    Ok(Outcome::Done)
}

fn empty(
    out: &mut dyn Write,
    json: bool,
    outcome: Outcome,
    message: &str,
) -> Result<Outcome, CommandError> {
    if json {
        report::write_json(out, &JsonOutput::default())?;
    } else {
        writeln!(out, "{message}")?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOptions, ReviewStatus};
    use crate::test_support::{pr, repository, two_roots};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn log_request(format: LogFormat) -> LogRequest {
        LogRequest {
            target: None,
            all: false,
            format,
            filter: PrFilter::at(FilterOptions::default(), now()),
            now: now(),
        }
    }

    fn run_log(repo: &Repository, request: &LogRequest) -> (Outcome, String) {
        let mut out = Vec::new();
        let outcome = log(repo, request, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_log_prunes_standalone_prs() {
        let repo = repository(two_roots());
        let (outcome, text) = run_log(&repo, &log_request(LogFormat::Small));
        assert_eq!(outcome, Outcome::Done);
        assert!(text.contains("#1 PR 1"));
        assert!(text.contains("  #2 PR 2"));
        assert!(!text.contains("#3"));
    }

    #[test]
    fn test_log_all_includes_standalone_prs() {
        let repo = repository(two_roots());
        let mut request = log_request(LogFormat::Small);
        request.all = true;
        let (_, text) = run_log(&repo, &request);
        assert!(text.contains("#3 PR 3"));
    }

    #[test]
    fn test_log_empty_repository() {
        let repo = repository(vec![]);
        let (outcome, text) = run_log(&repo, &log_request(LogFormat::Plain));
        assert_eq!(outcome, Outcome::NoChains);
        assert_eq!(text, "No PR chains\n");

        let (outcome, text) = run_log(&repo, &log_request(LogFormat::Json));
        assert_eq!(outcome, Outcome::NoChains);
        assert_eq!(text, "{\n  \"chains\": []\n}\n");
    }

    #[test]
    fn test_log_only_standalone_prs_has_no_chains() {
        let repo = repository(vec![pr(1, "main", "a"), pr(2, "main", "b")]);
        let (outcome, _) = run_log(&repo, &log_request(LogFormat::Plain));
        assert_eq!(outcome, Outcome::NoChains);
    }

    #[test]
    fn test_log_with_target() {
        let repo = repository(vec![
            pr(1, "main", "a"),
            pr(2, "a", "b"),
            pr(3, "main", "c"),
            pr(4, "c", "d"),
        ]);
        let mut request = log_request(LogFormat::Small);
        request.target = Some("d".to_string());
        let (outcome, text) = run_log(&repo, &request);
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(text, "#3 PR 3\n  #4 PR 4\n");

        request.target = Some("nope".to_string());
        let (outcome, text) = run_log(&repo, &request);
        assert_eq!(outcome, Outcome::NoChainForTarget);
        assert_eq!(text, "No PR chain found with filter\n");
    }

    #[test]
    fn test_log_no_matches_is_distinct() {
        let repo = repository(two_roots());
        let mut request = log_request(LogFormat::Small);
        request.filter = PrFilter::at(
            FilterOptions {
                review_status: ReviewStatus::Approved,
                ..Default::default()
            },
            now(),
        );
        let (outcome, text) = run_log(&repo, &request);
        assert_eq!(outcome, Outcome::NoMatches);
        assert_eq!(text, "No PRs matching the filters\n");
    }

    #[test]
    fn test_log_missing_base_shows_pr_under_root() {
        let repo = repository(vec![
            pr(1, "missing-branch", "feat-x"),
            pr(2, "feat-x", "feat-y"),
        ]);
        let (outcome, text) = run_log(&repo, &log_request(LogFormat::Small));
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(text, "#1 PR 1\n  #2 PR 2\n");
    }

    #[test]
    fn test_log_json_tree() {
        let repo = repository(two_roots());
        let (_, text) = run_log(&repo, &log_request(LogFormat::Json));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["chains"][0]["pullRequest"]["number"], 1);
        assert_eq!(value["chains"][0]["children"][0]["pullRequest"]["head"], "feat-b");
        assert_eq!(value["chains"].as_array().unwrap().len(), 1);
    }

    fn open_request(target: &str, print: bool) -> OpenRequest {
        OpenRequest {
            target: target.to_string(),
            print,
            format: ListFormat::Plain,
            filter: PrFilter::at(FilterOptions::default(), now()),
        }
    }

    #[test]
    fn test_open_prints_chain_urls() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        let mut opener = |_: &str| -> std::io::Result<()> { panic!("should not open") };
        let outcome = open(&repo, &open_request("feat-a", true), &mut out, &mut opener).unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "https://github.com/org/repo/pull/1\nhttps://github.com/org/repo/pull/2\n"
        );
    }

    #[test]
    fn test_open_uses_opener_in_chain_order() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        let mut opened = Vec::new();
        let mut opener = |url: &str| -> std::io::Result<()> {
            opened.push(url.to_string());
            Ok(())
        };
        open(&repo, &open_request("2", false), &mut out, &mut opener).unwrap();
        assert_eq!(
            opened,
            vec![
                "https://github.com/org/repo/pull/1",
                "https://github.com/org/repo/pull/2"
            ]
        );
    }

    #[test]
    fn test_open_reports_opener_failure() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        let mut opener = |_: &str| -> std::io::Result<()> { Err(std::io::Error::other("no browser")) };
        let err = open(&repo, &open_request("1", false), &mut out, &mut opener).unwrap_err();
        assert!(matches!(err, CommandError::Open { .. }));
    }

    #[test]
    fn test_open_filters_chain_members() {
        let mut prs = two_roots();
        prs[0].approved_by = Some("bob".to_string());
        let repo = repository(prs);
        let mut request = open_request("feat-b", true);
        request.filter = PrFilter::at(
            FilterOptions {
                review_status: ReviewStatus::Unapproved,
                ..Default::default()
            },
            now(),
        );
        let mut out = Vec::new();
        let mut opener = |_: &str| -> std::io::Result<()> { Ok(()) };
        open(&repo, &request, &mut out, &mut opener).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "https://github.com/org/repo/pull/2\n"
        );

        request.filter = PrFilter::at(
            FilterOptions {
                author: Some("nobody".to_string()),
                ..Default::default()
            },
            now(),
        );
        let mut out = Vec::new();
        let outcome = open(&repo, &request, &mut out, &mut opener).unwrap();
        assert_eq!(outcome, Outcome::NoMatches);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "No PR chain found matching the filters\n"
        );
    }

    #[test]
    fn test_open_unknown_target() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        let mut opener = |_: &str| -> std::io::Result<()> { Ok(()) };
        let mut request = open_request("", true);
        request.format = ListFormat::Json;
        let outcome = open(&repo, &request, &mut out, &mut opener).unwrap();
        assert_eq!(outcome, Outcome::NoChainForTarget);
        assert_eq!(String::from_utf8(out).unwrap(), "{\n  \"chains\": []\n}\n");
    }

    fn rebase_request(target: &str, format: ScriptFormat) -> RebaseRequest {
        RebaseRequest {
            target: target.to_string(),
            options: RebaseOptions::default(),
            run: false,
            shell: "$SHELL".to_string(),
            format,
        }
    }

    #[test]
    fn test_rebase_prints_script() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        let outcome = rebase(&repo, &rebase_request("feat-b", ScriptFormat::Script), &mut out).unwrap();
        assert_eq!(outcome, Outcome::Done);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("#!/bin/sh\n\nset -e\n"));
        let checkout_a = text.find("git checkout feat-a").unwrap();
        let checkout_b = text.find("git checkout feat-b").unwrap();
        assert!(checkout_a < checkout_b);
        assert!(!text.contains("feat-c"));
    }

    #[test]
    fn test_rebase_json_output() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        rebase(&repo, &rebase_request("1", ScriptFormat::Json), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["commands"].as_array().unwrap().len(), 6);
        assert_eq!(value["commands"][0], "git checkout feat-a");
        assert!(value["script"].as_str().unwrap().contains("set -e"));
    }

    #[test]
    fn test_rebase_no_chain() {
        let repo = repository(two_roots());
        let mut out = Vec::new();
        let outcome = rebase(&repo, &rebase_request("main", ScriptFormat::Script), &mut out).unwrap();
        assert_eq!(outcome, Outcome::NoChainForTarget);
        assert_eq!(String::from_utf8(out).unwrap(), "No PR chain found with filter\n");

        let mut out = Vec::new();
        rebase(&repo, &rebase_request("404", ScriptFormat::Json), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n  \"script\": \"\",\n  \"commands\": []\n}\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_rebase_run_propagates_failure() {
        let repo = repository(two_roots());
        let mut request = rebase_request("1", ScriptFormat::Script);
        request.run = true;
        request.shell = "false".to_string();
        let mut out = Vec::new();
        let err = rebase(&repo, &request, &mut out).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Rebase(RebaseError::ScriptFailed { .. })
        ));
    }
}
