use chrono::{DateTime, Utc};

/// One summarized PR as shown to the user.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub number: u64,
    /// `owner/name` of the repository the PR belongs to
    pub repository: String,
    pub title: String,
    /// PR body, None when missing or blank
    pub description: Option<String>,
    pub author: String,
    /// "open", "closed" or "merged"
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged: bool,
    pub url: String,
    /// Number of fetched comments
    pub comments: usize,
    pub summary: String,
    /// False when `summary` is a placeholder
    pub summarized: bool,
}

/// Complete report for one run.
#[derive(Debug)]
pub struct Report {
    /// `owner/name`
    pub repository: String,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn summarized_count(&self) -> usize {
        self.entries.iter().filter(|e| e.summarized).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.summarized_count()
    }
}
