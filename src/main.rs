mod chain;
mod commands;
mod config;
mod filter;
mod pr;
mod rebase;
mod report;
#[cfg(test)]
mod test_support;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use crate::commands::{LogRequest, OpenRequest, Outcome, RebaseRequest};
use crate::filter::{DraftState, FilterOptions, PrFilter, ReviewStatus, SizeBucket};
use crate::pr::{CachedSource, GitHubSource, PrError, PullRequestSource, RepoRef, Repository};
use crate::rebase::RebaseOptions;
use crate::report::{ListFormat, LogFormat, ScriptFormat};

/// chainlink: show, open and rebase chains of stacked GitHub pull requests.
#[derive(Parser, Debug)]
#[command(name = "chainlink", version, about)]
struct Cli {
    /// Repository as owner/repo (defaults to the origin remote of the current checkout)
    #[arg(short, long, global = true)]
    repo: Option<String>,

    /// Config file (defaults to .chainlink.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Always fetch fresh data instead of using the local cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show chains of stacked PRs (default)
    Log(LogArgs),
    /// Open every PR of a chain in the browser
    Open(OpenArgs),
    /// Print or run the git commands that rebase a chain
    Rebase(RebaseArgs),
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only PRs opened by this login
    #[arg(long)]
    author: Option<String>,

    #[arg(long, value_enum, default_value_t = ReviewStatus::Any)]
    review_status: ReviewStatus,

    /// Only PRs carrying this label (repeatable; any one matches)
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Only PRs with a pending review request for this login
    #[arg(long)]
    reviewer: Option<String>,

    #[arg(long, value_enum, default_value_t = DraftState::All)]
    draft: DraftState,

    /// Only PRs opened within this long (e.g. 36h, 7d, 2w)
    #[arg(long, value_parser = filter::parse_duration)]
    age: Option<chrono::Duration>,

    #[arg(long, value_enum, default_value_t = SizeBucket::All)]
    size: SizeBucket,
}

impl FilterArgs {
    fn into_filter(self) -> PrFilter {
        let options = FilterOptions {
            author: self.author,
            review_status: self.review_status,
            labels: self.labels.into_iter().collect(),
            reviewer: self.reviewer,
            draft: self.draft,
            max_age: self.age,
            size: self.size,
        };
        if options.is_empty() {
            return PrFilter::accept_all();
        }
        debug!(?options, "filtering pull requests");
        PrFilter::new(options)
    }
}

#[derive(Args, Debug, Default)]
struct LogArgs {
    /// Only show the chain through this branch or PR number
    target: Option<String>,

    /// Include PRs that are not part of a stack
    #[arg(short, long)]
    all: bool,

    #[arg(short, long, value_enum, default_value_t = LogFormat::Plain)]
    output: LogFormat,

    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Branch name or PR number in the chain
    target: String,

    /// Print the URLs instead of opening them
    #[arg(short, long)]
    print: bool,

    #[arg(short, long, value_enum, default_value_t = ListFormat::Plain)]
    output: ListFormat,

    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Args, Debug)]
struct RebaseArgs {
    /// Branch name or PR number in the chain
    target: String,

    /// Leave out the `git push` after each rebase
    #[arg(long)]
    no_push: bool,

    /// Arguments for `git push` (config default: --force-with-lease)
    #[arg(long, allow_hyphen_values = true)]
    push_args: Option<String>,

    /// Run the script instead of printing it
    #[arg(long)]
    run: bool,

    /// Interpreter for --run; `$SHELL` uses the SHELL environment variable
    #[arg(long)]
    shell: Option<String>,

    #[arg(short, long, value_enum, default_value_t = ScriptFormat::Script)]
    output: ScriptFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;

    let repo = pr::resolve_repo(cli.repo.as_deref())?;
    let _main_span = info_span!("chainlink", repo = %repo).entered();

    info!("fetching pull requests");
    let repository = fetch_repository(&config, &repo, cli.no_cache).await?;
    info!(prs = repository.pull_requests.len(), default_branch = %repository.default_branch, "fetched pull requests");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let command = cli.command.unwrap_or_else(|| Command::Log(LogArgs::default()));
    let outcome = match command {
        Command::Log(args) => {
            let request = LogRequest {
                target: args.target,
                all: args.all,
                format: args.output,
                filter: args.filters.into_filter(),
                now: Utc::now(),
            };
            commands::log(&repository, &request, &mut out)?
        }
        Command::Open(args) => {
            let request = OpenRequest {
                target: args.target,
                print: args.print,
                format: args.output,
                filter: args.filters.into_filter(),
            };
            commands::open(&repository, &request, &mut out, &mut |url: &str| open::that(url))?
        }
        Command::Rebase(args) => {
            let request = RebaseRequest {
                target: args.target,
                options: RebaseOptions {
                    push: !args.no_push,
                    push_args: args
                        .push_args
                        .unwrap_or_else(|| config.push_args().to_string()),
                },
                run: args.run,
                shell: args.shell.unwrap_or_else(|| config.shell().to_string()),
                format: args.output,
            };
            commands::rebase(&repository, &request, &mut out)?
        }
    };

    if outcome != Outcome::Done {
        debug!(?outcome, "nothing to show");
    }
    Ok(())
}

/// Fetch through the on-disk cache unless it is turned off.
async fn fetch_repository(
    config: &config::Config,
    repo: &RepoRef,
    no_cache: bool,
) -> Result<Repository, PrError> {
    let github = GitHubSource::new(config)?;
    if no_cache || !config.cache_enabled() {
        debug!("cache disabled");
        return github.fetch_repository(repo).await;
    }
    CachedSource::new(github, config.cache_dir(), config.cache_ttl())
        .fetch_repository(repo)
        .await
}
