use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = super::GitHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_repo(s)
    }
}

/// Lifecycle state as stored on a PR. "all" is only a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

/// How many PRs to pull from a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The `n` most recently created PRs (single page, capped at 100)
    Count(u32),
    /// Every PR created within the last `days` days
    Window { days: u32 },
}

/// A pull request as used by the summarizer.
/// Built from the pulls listing, the single-PR endpoint, or a search hit.
#[derive(Debug, Clone)]
pub struct PullRequestRecord {
    pub number: u64,
    /// Together with `number`, identifies the PR
    pub repository: RepoId,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: PrState,
    /// Author's GitHub login
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Set only when the PR was merged
    pub merged_at: Option<DateTime<Utc>>,
    /// Web page of the PR
    pub html_url: String,
    /// API URL of the issue comments for this PR
    pub comments_url: String,
    /// Comment bodies in chronological order; empty unless fetched
    pub comments: Vec<String>,
}

impl PullRequestRecord {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    pub login: String,
}

/// Item of `GET /repos/{owner}/{repo}/pulls` and body of `GET .../pulls/{n}`.
#[derive(Debug, Deserialize)]
pub(crate) struct PullDto {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: PrState,
    pub user: Option<UserDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub html_url: String,
    pub comments_url: String,
}

impl PullDto {
    pub fn into_record(self, repository: RepoId) -> PullRequestRecord {
        PullRequestRecord {
            number: self.number,
            repository,
            title: self.title,
            body: self.body,
            state: self.state,
            author: login_or_ghost(self.user),
            created_at: self.created_at,
            updated_at: self.updated_at,
            merged_at: self.merged_at,
            html_url: self.html_url,
            comments_url: self.comments_url,
            comments: Vec::new(),
        }
    }
}

/// Body of `GET /search/issues`.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchPage {
    #[serde(default)]
    pub items: Vec<SearchItemDto>,
}

/// A search hit. PR-only fields live under `pull_request`.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchItemDto {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: PrState,
    pub user: Option<UserDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub html_url: String,
    pub comments_url: String,
    /// API URL of the repository, e.g. https://api.github.com/repos/acme/widgets
    pub repository_url: String,
    pub pull_request: Option<SearchPullRefDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchPullRefDto {
    pub merged_at: Option<DateTime<Utc>>,
}

impl SearchItemDto {
    /// Returns None when the repository cannot be recovered from the hit.
    pub fn into_record(self) -> Option<PullRequestRecord> {
        let repository = repo_from_api_url(&self.repository_url)?;
        Some(PullRequestRecord {
            number: self.number,
            repository,
            title: self.title,
            body: self.body,
            state: self.state,
            author: login_or_ghost(self.user),
            created_at: self.created_at,
            updated_at: self.updated_at,
            merged_at: self.pull_request.and_then(|p| p.merged_at),
            html_url: self.html_url,
            comments_url: self.comments_url,
            comments: Vec::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentDto {
    #[serde(default)]
    pub body: Option<String>,
}

// Deleted accounts come back as null users.
fn login_or_ghost(user: Option<UserDto>) -> String {
    user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string())
}

fn repo_from_api_url(url: &str) -> Option<RepoId> {
    let (_, tail) = url.rsplit_once("/repos/")?;
    super::parse_repo(tail.trim_end_matches('/')).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_id_display() {
        let repo = RepoId {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
        };
        assert_eq!(repo.to_string(), "acme/widgets");
    }

    #[test]
    fn test_pull_dto_into_record() {
        let json = r#"{
            "number": 7,
            "title": "Tidy up",
            "body": null,
            "state": "closed",
            "user": {"login": "alice"},
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-02T10:00:00Z",
            "merged_at": "2024-03-02T09:00:00Z",
            "html_url": "https://github.com/acme/widgets/pull/7",
            "comments_url": "https://api.github.com/repos/acme/widgets/issues/7/comments"
        }"#;
        let dto: PullDto = serde_json::from_str(json).unwrap();
        let repo: RepoId = "acme/widgets".parse().unwrap();
        let record = dto.into_record(repo.clone());
        assert_eq!(record.number, 7);
        assert_eq!(record.repository, repo);
        assert_eq!(record.state, PrState::Closed);
        assert!(record.body.is_none());
        assert!(record.is_merged());
        assert!(record.comments.is_empty());
    }

    #[test]
    fn test_search_item_recovers_repository() {
        let json = r#"{
            "number": 3,
            "title": "Add docs",
            "body": "Docs",
            "state": "open",
            "user": null,
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": null,
            "html_url": "https://github.com/acme/widgets/pull/3",
            "comments_url": "https://api.github.com/repos/acme/widgets/issues/3/comments",
            "repository_url": "https://api.github.com/repos/acme/widgets",
            "pull_request": {"merged_at": null}
        }"#;
        let dto: SearchItemDto = serde_json::from_str(json).unwrap();
        let record = dto.into_record().unwrap();
        assert_eq!(record.repository.to_string(), "acme/widgets");
        assert_eq!(record.author, "ghost");
        assert!(!record.is_merged());
    }
}
