//! Short-lived on-disk cache of fetched repositories.
//!
//! Repeated invocations within the TTL reuse the last snapshot instead of
//! hitting the API again. Cache failures never fail a command.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::{PrError, PullRequestSource, RepoRef, Repository};

/// Wraps a source and serves its results from `<dir>/<owner>/<repo>.json`
/// while the file is younger than `ttl`.
pub struct CachedSource<S> {
    inner: S,
    dir: PathBuf,
    ttl: Duration,
}

impl<S> CachedSource<S> {
    pub fn new(inner: S, dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            inner,
            dir: dir.into(),
            ttl,
        }
    }

    fn path_for(&self, repo: &RepoRef) -> PathBuf {
        self.dir.join(&repo.owner).join(format!("{}.json", repo.repo))
    }

    fn load(&self, path: &Path) -> Option<Repository> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            debug!(path = %path.display(), age_secs = age.as_secs(), "cache entry expired");
            return None;
        }
        let contents = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(repository) => Some(repository),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn store(&self, path: &Path, repository: &Repository) {
        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| {
                let contents = serde_json::to_string(repository).map_err(std::io::Error::other)?;
                fs::write(path, contents)
            });
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "unable to cache data");
        }
    }
}

#[async_trait]
impl<S: PullRequestSource> PullRequestSource for CachedSource<S> {
    async fn fetch_repository(&self, repo: &RepoRef) -> Result<Repository, PrError> {
        let path = self.path_for(repo);
        if let Some(repository) = self.load(&path) {
            debug!(path = %path.display(), "using cached pull requests");
            return Ok(repository);
        }

        let repository = self.inner.fetch_repository(repo).await?;
        self.store(&path, &repository);
        Ok(repository)
    }
}
