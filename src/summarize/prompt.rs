use chrono::SecondsFormat;
use std::fmt::Write;

use crate::pr::{PrState, PullRequestRecord};

/// Stand-in for a missing or blank field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Line the model is asked to put between batched summaries.
pub const SEPARATOR: &str = "---";

/// Prompt for a single PR. Identical field values always yield the same bytes.
pub fn build_prompt(pr: &PullRequestRecord) -> String {
    let mut prompt = String::from("Please provide a concise summary of the following pull request.\n\n");
    push_fields(&mut prompt, pr);
    push_discussion(&mut prompt, pr);

    prompt.push_str(
        "\nFocus on:\n\
         1. The main purpose of the change\n\
         2. Key technical details\n\
         3. Impact on the codebase\n\
         \n\
         Summary:",
    );
    prompt
}

/// One prompt covering every PR, asking for summaries in input order
/// separated by `SEPARATOR`.
pub fn build_batch_prompt(prs: &[PullRequestRecord]) -> String {
    let mut prompt =
        String::from("Please provide a concise summary of each of the following pull requests.\n\n");

    for (index, pr) in prs.iter().enumerate() {
        let _ = writeln!(prompt, "PR {}:", index + 1);
        push_fields(&mut prompt, pr);
        push_discussion(&mut prompt, pr);
        prompt.push('\n');
    }

    let _ = write!(
        prompt,
        "For each pull request, focus on its main purpose, key technical details and impact.\n\
         Write exactly {} summaries, one per pull request, in order, separated by a line containing only {}.\n\
         \n\
         Summaries:",
        prs.len(),
        SEPARATOR
    );
    prompt
}

/// Status line value. Merged PRs are closed on GitHub but reported as merged.
pub fn status_label(pr: &PullRequestRecord) -> &'static str {
    match (pr.state, pr.is_merged()) {
        (_, true) => "merged",
        (PrState::Open, false) => "open",
        (PrState::Closed, false) => "closed",
    }
}

fn push_fields(prompt: &mut String, pr: &PullRequestRecord) {
    let _ = writeln!(prompt, "Title: {}", field(pr.title.as_deref()));
    let _ = writeln!(prompt, "Description: {}", field(pr.body.as_deref()));
    let _ = writeln!(
        prompt,
        "Created At: {}",
        pr.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(prompt, "Status: {}", status_label(pr));
}

// Fetched comments, if any, as a bulleted block.
fn push_discussion(prompt: &mut String, pr: &PullRequestRecord) {
    if pr.comments.is_empty() {
        return;
    }
    prompt.push_str("Discussion:\n");
    for comment in &pr.comments {
        let _ = writeln!(prompt, "- {}", field(Some(comment.as_str())));
    }
}

fn field(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => NOT_AVAILABLE,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pr::RepoId;
    use chrono::{TimeZone, Utc};

    pub fn sample_pr(number: u64, title: Option<&str>, body: Option<&str>) -> PullRequestRecord {
        PullRequestRecord {
            number,
            repository: RepoId {
                owner: "acme".to_string(),
                name: "widgets".to_string(),
            },
            title: title.map(str::to_string),
            body: body.map(str::to_string),
            state: PrState::Open,
            author: "alice".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            updated_at: None,
            merged_at: None,
            html_url: format!("https://github.com/acme/widgets/pull/{}", number),
            comments_url: format!("https://api.github.com/repos/acme/widgets/issues/{}/comments", number),
            comments: Vec::new(),
        }
    }

    #[test]
    fn test_prompt_layout() {
        let pr = sample_pr(10, Some("Fix bug"), Some("Fixes the crash on startup"));
        let expected = "Please provide a concise summary of the following pull request.\n\
                        \n\
                        Title: Fix bug\n\
                        Description: Fixes the crash on startup\n\
                        Created At: 2024-05-01T12:00:00Z\n\
                        Status: open\n\
                        \n\
                        Focus on:\n\
                        1. The main purpose of the change\n\
                        2. Key technical details\n\
                        3. Impact on the codebase\n\
                        \n\
                        Summary:";
        assert_eq!(build_prompt(&pr), expected);
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let pr = sample_pr(10, Some("Fix bug"), None);
        assert_eq!(build_prompt(&pr), build_prompt(&pr.clone()));
        let prs = vec![pr.clone(), sample_pr(11, Some("Add feature"), Some("New"))];
        assert_eq!(build_batch_prompt(&prs), build_batch_prompt(&prs));
    }

    #[test]
    fn test_missing_fields_render_as_sentinel() {
        let pr = sample_pr(1, None, None);
        let prompt = build_prompt(&pr);
        assert!(prompt.contains("Title: N/A\n"));
        assert!(prompt.contains("Description: N/A\n"));

        let blank = sample_pr(2, Some("   "), Some(""));
        let prompt = build_prompt(&blank);
        assert!(prompt.contains("Title: N/A\n"));
        assert!(prompt.contains("Description: N/A\n"));
    }

    #[test]
    fn test_prompt_includes_fetched_comments() {
        let mut pr = sample_pr(3, Some("Refactor"), Some("Split module"));
        pr.comments = vec!["Looks good".to_string(), "  Please add tests ".to_string()];
        let prompt = build_prompt(&pr);
        assert!(prompt.contains("Discussion:\n- Looks good\n- Please add tests\n"));
        assert!(prompt.ends_with("Summary:"));
    }

    #[test]
    fn test_merged_status() {
        let mut pr = sample_pr(4, Some("Ship it"), None);
        pr.state = PrState::Closed;
        assert_eq!(status_label(&pr), "closed");
        pr.merged_at = Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
        assert_eq!(status_label(&pr), "merged");
    }

    #[test]
    fn test_batch_prompt_enumerates_in_order() {
        let prs = vec![
            sample_pr(10, Some("Fix bug"), None),
            sample_pr(11, Some("Add feature"), Some("Adds the widget API")),
        ];
        let prompt = build_batch_prompt(&prs);
        let first = prompt.find("PR 1:\nTitle: Fix bug\nDescription: N/A\n").unwrap();
        let second = prompt
            .find("PR 2:\nTitle: Add feature\nDescription: Adds the widget API\n")
            .unwrap();
        assert!(first < second);
        assert!(prompt.contains("Write exactly 2 summaries"));
        assert!(prompt.contains("separated by a line containing only ---."));
        assert!(prompt.ends_with("Summaries:"));
    }

    #[test]
    fn test_batch_prompt_includes_comments_per_pr() {
        let mut commented = sample_pr(11, Some("Add feature"), None);
        commented.comments = vec!["Needs a changelog entry".to_string()];
        let prs = vec![sample_pr(10, Some("Fix bug"), None), commented];

        let prompt = build_batch_prompt(&prs);
        let discussion = prompt
            .find("Status: open\nDiscussion:\n- Needs a changelog entry\n\n")
            .unwrap();
        assert!(prompt.find("PR 2:").unwrap() < discussion);
        assert_eq!(prompt.matches("Discussion:").count(), 1);
    }
}
