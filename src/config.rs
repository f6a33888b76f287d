use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up in the current directory when no `--config` is given.
pub const CONFIG_FILE: &str = ".chainlink.toml";

pub const DEFAULT_API_URL: &str = "https://api.github.com/graphql";
pub const DEFAULT_MAX_PRS: usize = 500;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_PUSH_ARGS: &str = "--force-with-lease";
/// Shell placeholder resolved from the `SHELL` environment variable.
pub const SHELL_FROM_ENV: &str = "$SHELL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .chainlink.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rebase: RebaseConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// API token. If None, falls back to CHAINLINK_TOKEN then GITHUB_TOKEN.
    pub token: Option<String>,
    /// GraphQL endpoint, for GitHub Enterprise
    pub api_url: Option<String>,
    /// Stop paginating after this many PRs
    pub max_prs: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    pub enabled: Option<bool>,
    pub ttl_secs: Option<u64>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RebaseConfig {
    /// Arguments appended to `git push`
    pub push_args: Option<String>,
    /// Interpreter used by `rebase --run`
    pub shell: Option<String>,
}

impl Config {
    /// Load `path`, or .chainlink.toml in the current directory.
    /// Returns default config if the default file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the API token: config file value takes precedence, then
    /// CHAINLINK_TOKEN, then GITHUB_TOKEN.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| std::env::var("CHAINLINK_TOKEN").ok())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }

    pub fn api_url(&self) -> &str {
        self.github.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn max_prs(&self) -> usize {
        self.github.max_prs.unwrap_or(DEFAULT_MAX_PRS).max(1)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.enabled.unwrap_or(true)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS))
    }

    /// Configured cache directory, else `chainlink` under the per-user
    /// cache dir (the temp dir where the platform has none).
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("chainlink")
        })
    }

    pub fn push_args(&self) -> &str {
        self.rebase.push_args.as_deref().unwrap_or(DEFAULT_PUSH_ARGS)
    }

    pub fn shell(&self) -> &str {
        self.rebase.shell.as_deref().unwrap_or(SHELL_FROM_ENV)
    }
}
