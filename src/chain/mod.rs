//! Chain graph built from a flat list of pull requests.
//!
//! A PR is addressed either by its number or by its head branch. Every
//! PR points at a parent position (the PR whose head is its base branch)
//! and the synthetic position [`ROOT`] stands for the default branch.

pub mod traverse;

pub use traverse::ChainTarget;

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

use crate::pr::PullRequest;

/// A PR number, or [`ROOT`] for the default branch.
pub type Position = u64;

/// Position of the repository's default branch.
pub const ROOT: Position = 0;

static EMPTY: Relationship = Relationship {
    base: ROOT,
    following: Vec::new(),
};

/// Maps a branch name to the position whose head it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainIndex {
    branches: HashMap<String, Position>,
}

impl ChainIndex {
    /// Index seeded with the default branch only.
    pub fn new(default_branch: &str) -> Self {
        let mut branches = HashMap::new();
        branches.insert(default_branch.to_string(), ROOT);
        Self { branches }
    }

    /// Register `branch` as the head of `position`. A later call for the
    /// same branch replaces the earlier one.
    pub fn insert(&mut self, branch: &str, position: Position) {
        if let Some(previous) = self.branches.insert(branch.to_string(), position) {
            if previous != position {
                debug!(branch, previous, position, "duplicate head branch, keeping later PR");
            }
        }
    }

    /// Exact lookup; `None` when the branch is unknown.
    pub fn get(&self, branch: &str) -> Option<Position> {
        self.branches.get(branch).copied()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }
}

/// Parent position and ordered dependents of one position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationship {
    /// Position this PR is based on
    pub base: Position,
    /// PRs based on this position, in discovery order
    pub following: Vec<Position>,
}

/// Relationship entry per position. Missing keys read as an empty entry
/// based on [`ROOT`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipMap {
    entries: BTreeMap<Position, Relationship>,
}

impl RelationshipMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, position: Position) -> &Relationship {
        self.entries.get(&position).unwrap_or(&EMPTY)
    }

    pub fn base(&self, position: Position) -> Position {
        self.get(position).base
    }

    pub fn following(&self, position: Position) -> &[Position] {
        &self.get(position).following
    }

    #[cfg(test)]
    pub fn contains(&self, position: Position) -> bool {
        self.entries.contains_key(&position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Positions with an entry, in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.entries.keys().copied()
    }

    /// Set the base of `position`, keeping any dependents already recorded.
    pub fn set_base(&mut self, position: Position, base: Position) {
        self.entries.entry(position).or_default().base = base;
    }

    /// Append `child` to the dependents of `position`, keeping its base.
    /// A child already present is not added twice.
    pub fn push_following(&mut self, position: Position, child: Position) {
        let entry = self.entries.entry(position).or_default();
        if !entry.following.contains(&child) {
            entry.following.push(child);
        }
    }

    /// Replace the whole entry of `position`.
    pub fn insert(&mut self, position: Position, relationship: Relationship) {
        self.entries.insert(position, relationship);
    }
}

/// Chain index, relationship map and the PR records they were built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainGraph {
    index: ChainIndex,
    relations: RelationshipMap,
    prs: BTreeMap<u64, PullRequest>,
}

impl ChainGraph {
    /// Build the graph in two passes: first register every head branch,
    /// then link each PR to the position of its base branch. Input order
    /// decides the order of every `following` list.
    #[instrument(skip(prs), fields(prs = prs.len()))]
    pub fn build(default_branch: &str, prs: &[PullRequest]) -> Self {
        let mut index = ChainIndex::new(default_branch);
        for pr in prs {
            index.insert(&pr.head, pr.number);
        }

        let mut relations = RelationshipMap::new();
        for pr in prs {
            let base = match index.get(&pr.base) {
                Some(position) => position,
                None => {
                    // only the first page(s) of PRs are fetched, so the real parent may be missing
                    warn!(
                        "base missing for #{} ({}), using {}",
                        pr.number, pr.base, default_branch
                    );
                    ROOT
                }
            };
            relations.set_base(pr.number, base);
            relations.push_following(base, pr.number);
        }

        let prs: BTreeMap<u64, PullRequest> =
            prs.iter().map(|pr| (pr.number, pr.clone())).collect();
        debug!(branches = index.len(), positions = relations.len(), "built chain graph");

        Self {
            index,
            relations,
            prs,
        }
    }

    pub fn index(&self) -> &ChainIndex {
        &self.index
    }

    pub fn relations(&self) -> &RelationshipMap {
        &self.relations
    }

    pub fn pr(&self, number: u64) -> Option<&PullRequest> {
        self.prs.get(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.prs.is_empty()
    }
}
