pub mod types;

pub use types::{PrState, PullRequestRecord, RepoId, Selection};

use chrono::{Duration, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GitHubConfig;
use types::{CommentDto, PullDto, SearchPage};

/// GitHub's upper bound for `per_page`.
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid repository '{0}', expected owner/name")]
    InvalidRepoFormat(String),

    #[error("GitHub API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Not found on GitHub: {resource}")]
    NotFound { resource: String },

    #[error("Failed to decode GitHub response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("Invalid GitHub token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
}

/// Parse an `owner/name` repository identifier.
///
/// Both halves must be non-empty and free of whitespace; anything with more
/// or fewer than one slash is rejected.
pub fn parse_repo(input: &str) -> Result<RepoId, GitHubError> {
    let invalid = || GitHubError::InvalidRepoFormat(input.to_string());
    let trimmed = input.trim();
    let (owner, name) = trimmed.split_once('/').ok_or_else(invalid)?;

    let valid_part =
        |part: &str| !part.is_empty() && !part.contains('/') && !part.contains(char::is_whitespace);
    if !valid_part(owner) || !valid_part(name) {
        return Err(invalid());
    }

    Ok(RepoId {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Search string for PRs matching `qualifier` created on or after `since`.
pub fn search_query(qualifier: &str, since: NaiveDate) -> String {
    format!("{} type:pr created:>={}", qualifier, since.format("%Y-%m-%d"))
}

/// Thin wrapper over the GitHub REST API. Every request carries the same
/// token header; calls are made one at a time.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self, GitHubError> {
        let mut auth = HeaderValue::from_str(&format!("token {}", token))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("pr-summarizer"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Recent PRs for `repo`, newest first. Any failure is logged and turns
    /// into an empty list, so an empty result does not prove the repository
    /// has no PRs.
    pub async fn list_recent_pull_requests(
        &self,
        repo: &RepoId,
        selection: Selection,
    ) -> Vec<PullRequestRecord> {
        match self.try_list_recent_pull_requests(repo, selection).await {
            Ok(prs) => prs,
            Err(err) => {
                error!(repo = %repo, error = %err, "failed to list pull requests");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn try_list_recent_pull_requests(
        &self,
        repo: &RepoId,
        selection: Selection,
    ) -> Result<Vec<PullRequestRecord>, GitHubError> {
        match selection {
            Selection::Count(0) => Ok(Vec::new()),
            Selection::Count(count) => {
                let per_page = count.min(MAX_PER_PAGE);
                if per_page < count {
                    warn!(requested = count, per_page, "count exceeds one page, truncating");
                }
                let url = format!("{}/repos/{}/{}/pulls", self.api_url, repo.owner, repo.name);
                let query = [
                    ("state", "all".to_string()),
                    ("sort", "created".to_string()),
                    ("direction", "desc".to_string()),
                    ("per_page", per_page.to_string()),
                ];
                let pulls: Vec<PullDto> = self.get_json(&url, &query).await?;
                let records: Vec<_> = pulls
                    .into_iter()
                    .take(per_page as usize)
                    .map(|dto| dto.into_record(repo.clone()))
                    .collect();
                info!(found = records.len(), "listed pull requests");
                Ok(records)
            }
            Selection::Window { days } => {
                let qualifier = format!("repo:{}", repo);
                self.search_pull_requests(&qualifier, since_days(days)).await
            }
        }
    }

    /// PRs authored by `user` across all repositories in the last `days` days.
    /// Best-effort like `list_recent_pull_requests`.
    pub async fn list_user_pull_requests(&self, user: &str, days: u32) -> Vec<PullRequestRecord> {
        match self.try_list_user_pull_requests(user, days).await {
            Ok(prs) => prs,
            Err(err) => {
                error!(user, error = %err, "failed to search pull requests");
                Vec::new()
            }
        }
    }

    pub async fn try_list_user_pull_requests(
        &self,
        user: &str,
        days: u32,
    ) -> Result<Vec<PullRequestRecord>, GitHubError> {
        let qualifier = format!("author:{}", user);
        self.search_pull_requests(&qualifier, since_days(days)).await
    }

    /// Walk the search API page by page until a page comes back empty.
    ///
    /// A failing first page is an error. A failure after that ends the walk
    /// and keeps what was collected.
    #[instrument(skip(self))]
    async fn search_pull_requests(
        &self,
        qualifier: &str,
        since: NaiveDate,
    ) -> Result<Vec<PullRequestRecord>, GitHubError> {
        let url = format!("{}/search/issues", self.api_url);
        let q = search_query(qualifier, since);
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("q", q.clone()),
                ("sort", "created".to_string()),
                ("order", "desc".to_string()),
                ("per_page", MAX_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            debug!(page, "fetching search page");
            let result: Result<SearchPage, _> = self.get_json(&url, &query).await;
            let items = match result {
                Ok(found) => found.items,
                Err(err) if page == 1 => return Err(err),
                Err(err) => {
                    warn!(page, error = %err, "search page failed, keeping earlier pages");
                    break;
                }
            };
            if items.is_empty() {
                break;
            }
            records.extend(
                items
                    .into_iter()
                    .filter(|item| item.pull_request.is_some())
                    .filter_map(|item| item.into_record()),
            );
            page += 1;
        }

        info!(found = records.len(), pages = page - 1, "search complete");
        Ok(records)
    }

    /// Comment bodies of `pr` in chronological order. Comments only enrich the
    /// prompt, so failures yield an empty list.
    #[instrument(skip(self, pr), fields(pr = pr.number))]
    pub async fn fetch_comments(&self, pr: &PullRequestRecord) -> Vec<String> {
        match self.get_json::<Vec<CommentDto>>(&pr.comments_url, &[]).await {
            Ok(comments) => comments.into_iter().filter_map(|c| c.body).collect(),
            Err(err) => {
                warn!(endpoint = %pr.comments_url, error = %err, "failed to fetch comments");
                Vec::new()
            }
        }
    }

    /// Fetch comments for every PR in turn.
    pub async fn attach_comments(&self, prs: &mut [PullRequestRecord]) {
        for pr in prs.iter_mut() {
            pr.comments = self.fetch_comments(pr).await;
            debug!(pr = pr.number, comments = pr.comments.len(), "attached comments");
        }
    }

    /// A single PR with its comments attached.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn get_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<PullRequestRecord, GitHubError> {
        let url = format!("{}/repos/{}/{}/pulls/{}", self.api_url, repo.owner, repo.name, number);
        let dto: PullDto = match self.get_json(&url, &[]).await {
            Err(GitHubError::Upstream { status: 404, .. }) => {
                return Err(GitHubError::NotFound {
                    resource: format!("{}#{}", repo, number),
                })
            }
            other => other?,
        };
        let mut record = dto.into_record(repo.clone());
        record.comments = self.fetch_comments(&record).await;
        info!(comments = record.comments.len(), "fetched pull request");
        Ok(record)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let started = Instant::now();
        debug!(endpoint = %url, "GET");
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        debug!(
            endpoint = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "GitHub responded"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(endpoint = %url, status = status.as_u16(), %body, "GitHub error response");
            return Err(GitHubError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(GitHubError::Decode)
    }
}

/// First day of a window reaching `days` back from today. Windows older
/// than chrono can represent start at `NaiveDate::MIN`.
fn since_days(days: u32) -> NaiveDate {
    Duration::try_days(i64::from(days))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .map(|since| since.date_naive())
        .unwrap_or(NaiveDate::MIN)
}
