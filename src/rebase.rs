//! Rebase command sequence for a chain of PRs.
//!
//! The plan is rendered as a POSIX shell script, as a flat list of
//! commands, or piped into an interpreter.

use std::borrow::Cow;
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::chain::ChainGraph;
use crate::config::SHELL_FROM_ENV;

/// Interpreter used when `$SHELL` is requested but not set.
pub const FALLBACK_SHELL: &str = "/bin/sh";

const SCRIPT_PREAMBLE: [&str; 3] = ["#!/bin/sh", "", "set -e"];

#[derive(Debug, Error)]
pub enum RebaseError {
    #[error("No PR chain found with filter")]
    NoChain,

    #[error("Unable to start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rebase script failed under {shell} ({status})")]
    ScriptFailed { shell: String, status: ExitStatus },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseOptions {
    /// Force-push each branch after rebasing it
    pub push: bool,
    /// Arguments appended to `git push`
    pub push_args: String,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self {
            push: true,
            push_args: crate::config::DEFAULT_PUSH_ARGS.to_string(),
        }
    }
}

/// One step of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOp {
    Checkout { branch: String },
    Rebase { onto: String },
    Push { args: String },
}

impl std::fmt::Display for RebaseOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkout { branch } => write!(f, "git checkout {}", shell_quote(branch)),
            Self::Rebase { onto } => write!(f, "git rebase --update-refs {}", shell_quote(onto)),
            Self::Push { args } if args.trim().is_empty() => write!(f, "git push"),
            Self::Push { args } => write!(f, "git push {}", args.trim()),
        }
    }
}

/// Ordered operations for one chain, grouped per PR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebasePlan {
    steps: Vec<Vec<RebaseOp>>,
}

impl RebasePlan {
    /// Plan for `chain`, which must list ancestors before descendants (as
    /// [`ChainGraph::extract_chain`] does). Numbers without a PR record
    /// are skipped.
    pub fn new(graph: &ChainGraph, chain: &[u64], options: &RebaseOptions) -> Self {
        let steps = chain
            .iter()
            .filter_map(|&number| {
                let pr = graph.pr(number);
                if pr.is_none() {
                    warn!(pr = number, "no PR record for chain entry, skipping");
                }
                pr
            })
            .map(|pr| {
                let mut ops = vec![
                    RebaseOp::Checkout {
                        branch: pr.head.clone(),
                    },
                    RebaseOp::Rebase {
                        onto: pr.base.clone(),
                    },
                ];
                if options.push {
                    ops.push(RebaseOp::Push {
                        args: options.push_args.clone(),
                    });
                }
                ops
            })
            .collect();
        Self { steps }
    }

    /// Like [`new`](Self::new), but an empty chain is [`RebaseError::NoChain`].
    pub fn for_chain(
        graph: &ChainGraph,
        chain: &[u64],
        options: &RebaseOptions,
    ) -> Result<Self, RebaseError> {
        let plan = Self::new(graph, chain, options);
        if plan.is_empty() {
            return Err(RebaseError::NoChain);
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn operations(&self) -> impl Iterator<Item = &RebaseOp> {
        self.steps.iter().flatten()
    }

    /// Every command as its own string, in execution order.
    pub fn commands(&self) -> Vec<String> {
        self.operations().map(ToString::to_string).collect()
    }

    /// Shell script with a fail-fast preamble, one blank-line separated
    /// block per PR. Empty when the plan is.
    pub fn script(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut lines: Vec<String> = SCRIPT_PREAMBLE.iter().map(|l| l.to_string()).collect();
        for ops in &self.steps {
            lines.push(String::new());
            lines.extend(ops.iter().map(ToString::to_string));
        }
        lines.join("\n")
    }

    /// Pipe the script into `shell` and wait for it. Output of the
    /// commands goes straight to this process's stdout/stderr.
    #[instrument(skip(self))]
    pub fn execute(&self, shell: &str) -> Result<(), RebaseError> {
        if self.is_empty() {
            return Err(RebaseError::NoChain);
        }
        let shell = resolve_shell(shell, std::env::var("SHELL").ok());
        info!(%shell, "running rebase script");

        let spawn_error = |source: std::io::Error| RebaseError::Spawn {
            shell: shell.clone(),
            source,
        };
        let mut child = Command::new(&shell)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        let script = self.script();
        if let Some(mut stdin) = child.stdin.take() {
            // the interpreter may exit early (set -e), so a broken pipe here
            // is reported through the exit status instead
            if let Err(e) = stdin.write_all(script.as_bytes()) {
                debug!(error = %e, "interpreter closed stdin early");
            }
        }

        let status = child.wait().map_err(spawn_error)?;
        if !status.success() {
            return Err(RebaseError::ScriptFailed { shell, status });
        }
        Ok(())
    }
}

/// Branch names come from PR authors, so they are always quoted. Git ref
/// names cannot hold NUL, the only input `shlex` refuses.
fn shell_quote(value: &str) -> Cow<'_, str> {
    shlex::try_quote(value).unwrap_or(Cow::Borrowed("''"))
}

/// Resolve the `$SHELL` placeholder against the given environment value.
pub fn resolve_shell(shell: &str, env_shell: Option<String>) -> String {
    if shell == SHELL_FROM_ENV {
        return env_shell
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SHELL.to_string());
    }
    shell.to_string()
}
