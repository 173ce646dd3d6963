mod config;
mod pr;
mod report;
mod summarize;

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use summarize::llama::LlamaServerBackend;
use summarize::{SummaryMode, Summarizer};

/// Look-back window for `--author` when `--days` is not given.
const DEFAULT_AUTHOR_DAYS: u32 = 7;

/// PR Summarizer: fetches recent GitHub Pull Requests and summarizes each one
/// with a locally-hosted language model.
#[derive(Parser, Debug)]
#[command(name = "pr-summarizer", version, about)]
struct Cli {
    /// GitHub repository (e.g., acme/widgets). Prompted for when omitted.
    repo: Option<String>,

    /// Number of most recent PRs to summarize
    #[arg(short = 'n', long, default_value_t = 10)]
    count: u32,

    /// Summarize every PR created in the last N days instead of a fixed count
    #[arg(long)]
    days: Option<u32>,

    /// Summarize PRs authored by this user across all repositories
    #[arg(long, conflicts_with = "repo")]
    author: Option<String>,

    /// Summarize a single PR by number
    #[arg(long, conflicts_with_all = ["days", "author"])]
    pr: Option<u64>,

    /// Fetch PR comments and include them in the prompt
    #[arg(long)]
    comments: bool,

    /// One model call per PR, or one call for the whole batch
    #[arg(long, value_enum, default_value_t = SummaryMode::PerPr)]
    mode: SummaryMode,

    /// Config file (defaults to .pr-summarizer.toml in the current directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional output file path for a markdown report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Download the configured model file if it is missing, then exit
    #[arg(long)]
    download_model: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::AppConfig::load(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    if cli.download_model {
        let path = summarize::download::ensure_model(&config.model).await?;
        info!(path = %path.display(), "model available");
        return Ok(());
    }

    config.validate()?;
    let client = pr::GitHubClient::new(&config.github, config.github_token()?)?;

    let (label, mut pull_requests) = match cli.author.as_deref() {
        Some(author) => {
            let days = cli.days.unwrap_or(DEFAULT_AUTHOR_DAYS);
            info!(author, days, "searching pull requests by author");
            let found = client.list_user_pull_requests(author, days).await;
            (format!("author:{}", author), found)
        }
        None => {
            let input = match cli.repo {
                Some(repo) => repo,
                None => prompt_for_repo()?,
            };
            let repo = pr::parse_repo(&input)?;
            info!(repo = %repo, "selected repository");

            let found = match cli.pr {
                Some(number) => vec![client.get_pull_request(&repo, number).await?],
                None => {
                    let selection = match cli.days {
                        Some(days) => pr::Selection::Window { days },
                        None => pr::Selection::Count(cli.count),
                    };
                    client.list_recent_pull_requests(&repo, selection).await
                }
            };
            (repo.to_string(), found)
        }
    };

    if pull_requests.is_empty() {
        warn!("no pull requests found or failed to fetch them, nothing to summarize");
    } else if cli.comments && cli.pr.is_none() {
        info!(count = pull_requests.len(), "fetching comments");
        client.attach_comments(&mut pull_requests).await;
    }

    info!(count = pull_requests.len(), mode = ?cli.mode, "summarizing pull requests");
    let summarizer = Summarizer::new(LlamaServerBackend::new(), config.model.clone());
    let results = summarizer.summarize(&pull_requests, cli.mode).await;

    let built_report = report::build(&label, &results);
    report::output(&built_report, cli.output.as_deref())?;
    info!(
        summarized = built_report.summarized_count(),
        failed = built_report.failed_count(),
        "done"
    );

    Ok(())
}

/// Ask once on stdin for an `owner/repo` identifier.
fn prompt_for_repo() -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "Enter GitHub repository (owner/repo): ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
