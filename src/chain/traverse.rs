//! Read-only walks over a [`RelationshipMap`].

use std::collections::HashSet;
use tracing::{debug, warn};

use super::{ChainGraph, Position, Relationship, RelationshipMap, ROOT};

/// User input naming a chain: a PR number or a branch name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainTarget {
    Number(u64),
    Branch(String),
}

impl ChainTarget {
    /// Parse a filter argument. Decimal input is a PR number, anything
    /// else a branch name. Blank input names nothing.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match input.parse::<u64>() {
            Ok(number) => Some(Self::Number(number)),
            Err(_) => Some(Self::Branch(input.to_string())),
        }
    }
}

impl std::fmt::Display for ChainTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(f, "#{number}"),
            Self::Branch(branch) => write!(f, "{branch}"),
        }
    }
}

impl ChainGraph {
    /// Position of the PR named by `target`.
    ///
    /// `None` when the branch or number is unknown, and for the default
    /// branch itself: the root is not a PR and has no chain of its own.
    pub fn resolve_target(&self, target: &ChainTarget) -> Option<Position> {
        let position = match target {
            ChainTarget::Number(number) => Some(*number),
            ChainTarget::Branch(branch) => self.index().get(branch),
        }?;
        if position == ROOT || self.pr(position).is_none() {
            debug!(%target, "no PR found for target");
            return None;
        }
        Some(position)
    }

    /// PR numbers of the chain through `target`: its ancestors from the
    /// default branch down, then its own subtree in pre-order. Empty when
    /// the target does not resolve.
    pub fn extract_chain(&self, target: &ChainTarget) -> Vec<u64> {
        match self.resolve_target(target) {
            Some(position) => self.relations().extract_chain(position),
            None => Vec::new(),
        }
    }
}

impl RelationshipMap {
    /// Depth-first pre-order walk below `root` in `following` order.
    /// Direct children of `root` are at depth 0. `visit` returns whether
    /// the position was shown: children of a hidden position take its
    /// depth instead of one below it. Hidden positions are still descended
    /// into.
    pub fn for_each_descendant<F>(&self, root: Position, mut visit: F)
    where
        F: FnMut(Position, usize) -> bool,
    {
        let mut seen = HashSet::from([root]);
        self.walk(root, 0, &mut seen, &mut visit);
    }

    /// [`for_each_descendant`](Self::for_each_descendant) showing only
    /// the positions accepted by `keep`.
    pub fn for_each_matching<P, F>(&self, root: Position, keep: P, mut visit: F)
    where
        P: Fn(Position) -> bool,
        F: FnMut(Position, usize),
    {
        self.for_each_descendant(root, |position, depth| {
            let shown = keep(position);
            if shown {
                visit(position, depth);
            }
            shown
        });
    }

    /// `visit` returns whether the position takes up a depth level.
    fn walk<F>(&self, parent: Position, depth: usize, seen: &mut HashSet<Position>, visit: &mut F)
    where
        F: FnMut(Position, usize) -> bool,
    {
        for &child in self.following(parent) {
            if !seen.insert(child) {
                warn!(position = child, "PR reached twice while walking chains, skipping");
                continue;
            }
            let next = if visit(child, depth) { depth + 1 } else { depth };
            self.walk(child, next, seen, visit);
        }
    }

    /// Copy of the map whose root level only keeps PRs that have at least
    /// one dependent, i.e. PRs that are part of a multi-PR stack.
    pub fn prune_singletons(&self) -> RelationshipMap {
        let mut pruned = self.clone();
        let stacked = self
            .following(ROOT)
            .iter()
            .copied()
            .filter(|&position| !self.following(position).is_empty())
            .collect();
        pruned.insert(
            ROOT,
            Relationship {
                base: self.base(ROOT),
                following: stacked,
            },
        );
        pruned
    }

    /// Ancestors of `target` from [`ROOT`] down, followed by `target` and
    /// its descendants in pre-order. The sequence starts with the `ROOT`
    /// sentinel; it is empty when `target` is `ROOT`.
    pub fn chain_positions(&self, target: Position) -> Vec<Position> {
        if target == ROOT {
            return Vec::new();
        }

        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([target]);
        let mut current = target;
        loop {
            let base = self.base(current);
            if !seen.insert(base) {
                warn!(position = target, "cycle in base branches, stopping ancestor walk");
                break;
            }
            ancestors.push(base);
            if base == ROOT {
                break;
            }
            current = base;
        }
        ancestors.reverse();

        let mut visited: HashSet<Position> = ancestors.iter().copied().collect();
        let mut positions = ancestors;
        let mut stack = vec![target];
        while let Some(position) = stack.pop() {
            if !visited.insert(position) {
                continue;
            }
            positions.push(position);
            // reversed so the first child is popped next
            stack.extend(self.following(position).iter().rev());
        }

        positions
    }

    /// [`chain_positions`](Self::chain_positions) without the `ROOT` sentinel.
    pub fn extract_chain(&self, target: Position) -> Vec<u64> {
        self.chain_positions(target)
            .into_iter()
            .filter(|&position| position != ROOT)
            .collect()
    }

    /// Copy of the map restricted to `positions` (plus `ROOT`): entries
    /// for other positions are dropped and `following` lists only keep
    /// members, so walking from `ROOT` shows just that chain.
    pub fn restrict_to(&self, positions: &[Position]) -> RelationshipMap {
        let members: HashSet<Position> = positions.iter().copied().chain([ROOT]).collect();
        let mut restricted = RelationshipMap::new();
        for position in self.positions().filter(|p| members.contains(p)) {
            let entry = self.get(position);
            restricted.insert(
                position,
                Relationship {
                    base: entry.base,
                    following: entry
                        .following
                        .iter()
                        .copied()
                        .filter(|p| members.contains(p))
                        .collect(),
                },
            );
        }
        restricted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pr, two_roots};

    fn map(entries: &[(Position, Position, &[Position])]) -> RelationshipMap {
        let mut map = RelationshipMap::new();
        for &(position, base, following) in entries {
            map.insert(
                position,
                Relationship {
                    base,
                    following: following.to_vec(),
                },
            );
        }
        map
    }

    #[test]
    fn test_chain_positions_one_level() {
        let m = map(&[(1, 0, &[2, 3])]);
        assert_eq!(m.chain_positions(1), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_chain_positions_two_level() {
        let m = map(&[(1, 0, &[2, 3]), (2, 1, &[4]), (4, 2, &[5]), (5, 4, &[])]);
        assert_eq!(m.chain_positions(1), vec![0, 1, 2, 4, 5, 3]);
    }

    #[test]
    fn test_chain_positions_two_level_multiple_items() {
        let m = map(&[
            (1, 0, &[2, 3]),
            (2, 1, &[4, 6]),
            (4, 2, &[5, 7]),
            (5, 4, &[]),
            (6, 2, &[]),
            (7, 4, &[]),
        ]);
        assert_eq!(m.chain_positions(1), vec![0, 1, 2, 4, 5, 7, 6, 3]);
    }

    #[test]
    fn test_chain_positions_from_middle() {
        let m = map(&[
            (1, 0, &[2, 3]),
            (3, 1, &[4]),
            (4, 3, &[5]),
            (5, 4, &[6]),
            (6, 5, &[7]),
        ]);
        assert_eq!(m.chain_positions(4), vec![0, 1, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_extract_linear_stack_from_either_end() {
        let prs = vec![pr(1, "main", "a"), pr(2, "a", "b"), pr(3, "b", "c")];
        let graph = ChainGraph::build("main", &prs);
        assert_eq!(graph.extract_chain(&ChainTarget::Number(3)), vec![1, 2, 3]);
        assert_eq!(graph.extract_chain(&ChainTarget::Number(1)), vec![1, 2, 3]);
    }

    #[test]
    fn test_extract_branching_stack() {
        let m = map(&[(0, 0, &[1]), (1, 0, &[2, 3]), (2, 1, &[4])]);
        assert_eq!(m.extract_chain(1), vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_extract_by_branch_name() {
        let graph = ChainGraph::build("main", &two_roots());
        let target = ChainTarget::parse("feat-b").unwrap();
        assert_eq!(graph.extract_chain(&target), vec![1, 2]);
    }

    #[test]
    fn test_unresolved_targets_yield_empty_chain() {
        let graph = ChainGraph::build("main", &two_roots());
        for input in ["unknown-branch", "99", "0", "main"] {
            let target = ChainTarget::parse(input).unwrap();
            assert!(graph.resolve_target(&target).is_none(), "{input} resolved");
            assert!(graph.extract_chain(&target).is_empty(), "{input} extracted");
        }
        assert!(graph.relations().extract_chain(ROOT).is_empty());
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(ChainTarget::parse("42"), Some(ChainTarget::Number(42)));
        assert_eq!(
            ChainTarget::parse(" feat-a "),
            Some(ChainTarget::Branch("feat-a".to_string()))
        );
        assert_eq!(
            ChainTarget::parse("-1"),
            Some(ChainTarget::Branch("-1".to_string()))
        );
        assert_eq!(ChainTarget::parse("   "), None);
    }

    #[test]
    fn test_prune_singletons_drops_standalone_root_prs() {
        let graph = ChainGraph::build("main", &two_roots());
        let pruned = graph.relations().prune_singletons();
        assert_eq!(pruned.following(ROOT), &[1]);
        assert_eq!(pruned.following(1), &[2]);
        // entries below the root level are copied unchanged
        assert!(pruned.contains(3));
    }

    #[test]
    fn test_prune_never_drops_positions_with_dependents() {
        let prs = vec![
            pr(1, "main", "a"),
            pr(2, "a", "b"),
            pr(3, "main", "c"),
            pr(4, "main", "d"),
            pr(5, "d", "e"),
            pr(6, "b", "f"),
        ];
        let graph = ChainGraph::build("main", &prs);
        let relations = graph.relations();
        let pruned = relations.prune_singletons();
        for position in relations.positions() {
            if position != ROOT {
                assert_eq!(pruned.get(position), relations.get(position));
            }
        }
        for &position in relations.following(ROOT) {
            let kept = pruned.following(ROOT).contains(&position);
            assert_eq!(kept, !relations.following(position).is_empty());
        }
    }

    #[test]
    fn test_for_each_descendant_preorder_with_depth() {
        let m = map(&[(0, 0, &[1, 5]), (1, 0, &[2, 3]), (2, 1, &[4])]);
        let mut visited = Vec::new();
        m.for_each_descendant(ROOT, |position, depth| {
            visited.push((position, depth));
            true
        });
        assert_eq!(visited, vec![(1, 0), (2, 1), (4, 2), (3, 1), (5, 0)]);

        visited.clear();
        m.for_each_descendant(ROOT, |position, depth| {
            visited.push((position, depth));
            position != 1
        });
        assert_eq!(visited, vec![(1, 0), (2, 0), (4, 1), (3, 0), (5, 0)]);
    }

    #[test]
    fn test_for_each_matching_surfaces_children_of_rejected_parent() {
        let m = map(&[(0, 0, &[1]), (1, 0, &[2]), (2, 1, &[3]), (3, 2, &[])]);
        let mut visited = Vec::new();
        m.for_each_matching(ROOT, |position| position != 1 && position != 2, |position, depth| {
            visited.push((position, depth))
        });
        assert_eq!(visited, vec![(3, 0)]);

        visited.clear();
        m.for_each_matching(ROOT, |position| position != 2, |position, depth| {
            visited.push((position, depth))
        });
        assert_eq!(visited, vec![(1, 0), (3, 1)]);
    }

    #[test]
    fn test_restrict_to_chain() {
        let prs = vec![
            pr(1, "main", "a"),
            pr(2, "a", "b"),
            pr(3, "a", "c"),
            pr(4, "main", "d"),
        ];
        let graph = ChainGraph::build("main", &prs);
        let chain = graph.relations().chain_positions(2);
        let restricted = graph.relations().restrict_to(&chain);
        assert_eq!(restricted.following(ROOT), &[1]);
        assert_eq!(restricted.following(1), &[2]);
        assert!(!restricted.contains(3));
        assert!(!restricted.contains(4));
    }

    #[test]
    fn test_cycle_in_bases_terminates() {
        let prs = vec![pr(1, "b", "a"), pr(2, "a", "b")];
        let graph = ChainGraph::build("main", &prs);
        let chain = graph.extract_chain(&ChainTarget::Number(1));
        assert_eq!(chain, vec![2, 1]);
    }
}
