//! Filter predicate applied to individual pull requests.
//!
//! Every criterion left at its default is not applied; the rest are ANDed.

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::pr::PullRequest;

/// Upper bound (inclusive) of the `small` size bucket, in changed lines.
pub const SMALL_MAX_LINES: u64 = 100;
/// Upper bound (inclusive) of the `medium` size bucket, in changed lines.
pub const MEDIUM_MAX_LINES: u64 = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid duration '{0}' (expected e.g. 90m, 24h, 7d, 2w)")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReviewStatus {
    #[default]
    Any,
    Approved,
    Pending,
    Unapproved,
    ChangesRequested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DraftState {
    #[default]
    All,
    Draft,
    Ready,
}

/// Change-size bucket over combined added + deleted lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SizeBucket {
    #[default]
    All,
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    pub fn contains(self, lines: u64) -> bool {
        match self {
            Self::All => true,
            Self::Small => lines <= SMALL_MAX_LINES,
            Self::Medium => lines > SMALL_MAX_LINES && lines <= MEDIUM_MAX_LINES,
            Self::Large => lines > MEDIUM_MAX_LINES,
        }
    }
}

/// Criteria requested by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub author: Option<String>,
    pub review_status: ReviewStatus,
    /// A PR matches when it carries any of these labels
    pub labels: BTreeSet<String>,
    pub reviewer: Option<String>,
    pub draft: DraftState,
    /// Maximum time since the PR was opened
    pub max_age: Option<Duration>,
    pub size: SizeBucket,
}

impl FilterOptions {
    /// Whether no criterion is set, so every PR matches.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Predicate built from [`FilterOptions`] and a fixed reference time, so
/// repeated evaluation of the same PR always gives the same answer.
#[derive(Debug, Clone)]
pub struct PrFilter {
    options: FilterOptions,
    now: DateTime<Utc>,
}

impl PrFilter {
    pub fn new(options: FilterOptions) -> Self {
        Self::at(options, Utc::now())
    }

    /// Predicate evaluating ages relative to `now`.
    pub fn at(options: FilterOptions, now: DateTime<Utc>) -> Self {
        Self { options, now }
    }

    /// Predicate that accepts every PR.
    pub fn accept_all() -> Self {
        Self::new(FilterOptions::default())
    }

    pub fn matches(&self, pr: &PullRequest) -> bool {
        let opts = &self.options;

        if let Some(author) = opts.author.as_deref().filter(|a| !a.is_empty()) {
            if pr.author != author {
                return false;
            }
        }

        let review_ok = match opts.review_status {
            ReviewStatus::Any => true,
            ReviewStatus::Approved => pr.is_approved(),
            ReviewStatus::Pending | ReviewStatus::Unapproved => !pr.is_approved(),
            ReviewStatus::ChangesRequested => pr.has_changes_requested,
        };
        if !review_ok {
            return false;
        }

        if !opts.labels.is_empty() && opts.labels.is_disjoint(&pr.labels) {
            return false;
        }

        if let Some(reviewer) = opts.reviewer.as_deref().filter(|r| !r.is_empty()) {
            if !pr.reviewers.contains(reviewer) {
                return false;
            }
        }

        let draft_ok = match opts.draft {
            DraftState::All => true,
            DraftState::Draft => pr.is_draft,
            DraftState::Ready => !pr.is_draft,
        };
        if !draft_ok {
            return false;
        }

        if let Some(max_age) = opts.max_age {
            if self.now - pr.created_at > max_age {
                return false;
            }
        }

        opts.size.contains(pr.change_size())
    }
}

/// Parse a duration such as `90s`, `1h30m`, `7d` or `2w`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`, `d` (24h), `w` (7d).
/// Components may be fractional (`1.5h`) and can be chained.
pub fn parse_duration(input: &str) -> Result<Duration, FilterError> {
    let invalid = || FilterError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::zero());
    }

    let mut total_nanos: i64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let value: f64 = number.parse().map_err(|_| invalid())?;
        let unit_nanos: f64 = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "d" => 86_400.0 * 1e9,
            "w" => 7.0 * 86_400.0 * 1e9,
            _ => return Err(invalid()),
        };
        let nanos = value * unit_nanos;
        if !nanos.is_finite() || nanos > i64::MAX as f64 {
            return Err(invalid());
        }
        total_nanos = total_nanos
            .checked_add(nanos as i64)
            .ok_or_else(invalid)?;
        rest = next;
    }

    Ok(Duration::nanoseconds(total_nanos))
}
