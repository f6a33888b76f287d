//! Shared fixtures for unit tests.

use chrono::{TimeZone, Utc};
use std::io;
use std::sync::{Arc, Mutex};

use crate::pr::{PullRequest, Repository};

/// Helper to create a minimal PullRequest for testing.
pub fn pr(number: u64, base: &str, head: &str) -> PullRequest {
    PullRequest {
        number,
        base: base.to_string(),
        head: head.to_string(),
        title: format!("PR {number}"),
        author: "alice".to_string(),
        approved_by: None,
        has_changes_requested: false,
        has_comments: false,
        labels: Default::default(),
        reviewers: Default::default(),
        is_draft: false,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        additions: 10,
        deletions: 5,
    }
}

/// Helper to wrap PRs into a repository snapshot with `main` as default branch.
pub fn repository(pull_requests: Vec<PullRequest>) -> Repository {
    Repository {
        url: "https://github.com/org/repo".to_string(),
        default_branch: "main".to_string(),
        pull_requests,
    }
}

/// `#1 main<-feat-a`, `#2 feat-a<-feat-b`, `#3 main<-feat-c`.
pub fn two_roots() -> Vec<PullRequest> {
    vec![
        pr(1, "main", "feat-a"),
        pr(2, "feat-a", "feat-b"),
        pr(3, "main", "feat-c"),
    ]
}

/// In-memory log sink for asserting on emitted diagnostics.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Run `f` with a subscriber writing plain-text events into this sink.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
