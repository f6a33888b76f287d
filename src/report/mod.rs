pub mod types;

pub use types::{JsonChain, JsonOutput, JsonPullRequest, JsonRebaseOutput};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::{Color, Colorize};
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

use crate::chain::{ChainGraph, Position, RelationshipMap, ROOT};
use crate::filter::PrFilter;
use crate::pr::{PullRequest, Repository};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write output: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to encode JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output of `log`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One line per PR with author, branch and age
    #[default]
    Plain,
    /// Number and title only
    Small,
    /// Markdown bullet list with links
    Markdown,
    Json,
}

/// Output of `open`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    #[default]
    Plain,
    Json,
}

/// Output of `rebase`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ScriptFormat {
    /// Shell script ready to pipe into `sh`
    #[default]
    Script,
    Json,
}

/// One rendered line of the forest, before indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestLine {
    pub number: u64,
    pub depth: usize,
}

/// Visible PRs of the forest below [`ROOT`], in display order. A PR
/// rejected by `filter` is left out without hiding its descendants;
/// they move up to the depth it would have taken.
pub fn visible_forest(
    graph: &ChainGraph,
    relations: &RelationshipMap,
    filter: &PrFilter,
) -> Vec<ForestLine> {
    let mut lines = Vec::new();
    relations.for_each_matching(
        ROOT,
        |position| graph.pr(position).is_some_and(|pr| filter.matches(pr)),
        |number, depth| lines.push(ForestLine { number, depth }),
    );
    lines
}

/// Indented text lines for `log` in one of the text formats.
pub fn render_forest(
    repository: &Repository,
    graph: &ChainGraph,
    lines: &[ForestLine],
    format: LogFormat,
    now: DateTime<Utc>,
) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| {
            let pr = graph.pr(line.number)?;
            let text = match format {
                LogFormat::Small => format_pr_small(pr),
                LogFormat::Markdown => format_pr_markdown(pr, repository),
                LogFormat::Plain | LogFormat::Json => format_pr(pr, repository, now),
            };
            Some(format!("{}{}", "  ".repeat(line.depth), text))
        })
        .collect()
}

/// JSON tree for `log`. Children of a PR rejected by `filter` are attached
/// to the nearest accepted ancestor, or to the top level.
pub fn json_forest(
    repository: &Repository,
    graph: &ChainGraph,
    relations: &RelationshipMap,
    filter: &PrFilter,
) -> JsonOutput {
    let mut seen = std::collections::HashSet::from([ROOT]);
    JsonOutput {
        chains: json_children(repository, graph, relations, filter, ROOT, &mut seen),
    }
}

fn json_children(
    repository: &Repository,
    graph: &ChainGraph,
    relations: &RelationshipMap,
    filter: &PrFilter,
    parent: Position,
    seen: &mut std::collections::HashSet<Position>,
) -> Vec<JsonChain> {
    let mut chains = Vec::new();
    for &child in relations.following(parent) {
        if !seen.insert(child) {
            continue;
        }
        let children = json_children(repository, graph, relations, filter, child, seen);
        match graph.pr(child).filter(|pr| filter.matches(pr)) {
            Some(pr) => chains.push(JsonChain {
                pull_request: JsonPullRequest::new(pr, repository),
                children,
            }),
            None => chains.extend(children),
        }
    }
    chains
}

/// Flat JSON list (no children) for the PRs of one chain.
pub fn json_flat(repository: &Repository, prs: &[&PullRequest]) -> JsonOutput {
    JsonOutput {
        chains: prs
            .iter()
            .map(|pr| JsonChain {
                pull_request: JsonPullRequest::new(pr, repository),
                children: Vec::new(),
            })
            .collect(),
    }
}

/// Pretty-print `value` as JSON followed by a newline.
pub fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// `#42 Title (author) [branch] 3d ago`, linked to the PR when colour is on.
pub fn format_pr(pr: &PullRequest, repository: &Repository, now: DateTime<Utc>) -> String {
    let author = pr.author.color(author_color(&pr.author));
    let number = format_number(pr);
    let number = if colored::control::SHOULD_COLORIZE.should_colorize() {
        hyperlink(&repository.pr_url(pr.number), &number)
    } else {
        number
    };
    format!(
        "{} {} ({}) [{}] {} ago",
        number,
        pr.title,
        author,
        pr.head,
        format_age(now - pr.created_at)
    )
}

/// `#42 Title`
pub fn format_pr_small(pr: &PullRequest) -> String {
    format!("{} {}", format_number(pr), pr.title)
}

/// `- [#42](https://github.com/org/repo/pull/42) Title`
pub fn format_pr_markdown(pr: &PullRequest, repository: &Repository) -> String {
    format!(
        "- [#{}]({}) {}",
        pr.number,
        repository.pr_url(pr.number),
        pr.title
    )
}

/// `#42`, green once approved.
fn format_number(pr: &PullRequest) -> String {
    let number = format!("#{}", pr.number);
    if pr.is_approved() {
        number.green().to_string()
    } else {
        number
    }
}

/// OSC 8 terminal hyperlink.
fn hyperlink(url: &str, text: &str) -> String {
    format!("\x1b]8;;{url}\x07{text}\x1b]8;;\x07")
}

/// Hours below a day, days below 30 days, months after that.
pub fn format_age(age: chrono::Duration) -> String {
    let hours = age.num_hours().max(0);
    if hours < 24 {
        format!("{hours}h")
    } else if hours < 30 * 24 {
        format!("{}d", age.num_days())
    } else {
        format!("{}mo", age.num_days() / 30)
    }
}

/// Stable per-login colour: a hue picked from the login, fixed saturation
/// and lightness so every author stays readable.
pub fn author_color(login: &str) -> Color {
    let sum: u32 = login.chars().map(u32::from).sum();
    let (r, g, b) = hsl_to_rgb(f64::from(sum % 355), 0.5, 0.5);
    Color::TrueColor { r, g, b }
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (u8, u8, u8) {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r), channel(g), channel(b))
}
