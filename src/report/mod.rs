pub mod types;

pub use types::{Report, ReportEntry};

use chrono::{DateTime, Utc};
use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::summarize::prompt::{status_label, NOT_AVAILABLE};
use crate::summarize::SummaryResult;

const RULE_WIDTH: usize = 80;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Write(#[from] std::io::Error),
}

/// Build a Report from the summaries of one run, keeping their order.
pub fn build(repository: &str, results: &[SummaryResult<'_>]) -> Report {
    let entries = results
        .iter()
        .map(|result| {
            let pr = result.pr;
            ReportEntry {
                number: pr.number,
                repository: pr.repository.to_string(),
                title: pr.title.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                description: pr
                    .body
                    .as_deref()
                    .map(str::trim)
                    .filter(|body| !body.is_empty())
                    .map(str::to_string),
                author: pr.author.clone(),
                status: status_label(pr).to_string(),
                created_at: pr.created_at,
                updated_at: pr.updated_at,
                merged: pr.is_merged(),
                url: pr.html_url.clone(),
                comments: pr.comments.len(),
                summary: result.text.clone(),
                summarized: result.succeeded,
            }
        })
        .collect();

    Report {
        repository: repository.to_string(),
        entries,
    }
}

/// Output the report to the terminal (default) or to a markdown file.
#[instrument(skip(report), fields(repo = %report.repository, entries = report.entries.len()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_terminal_report(report, &mut handle)?;
            handle.flush()?;
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report))?;
            Ok(())
        }
    }
}

/// Render the report with colors to `out`.
///
/// PR #10: "Fix bug"
///   Author:   alice
///   Created:  May 01, 2024 at 12:00 PM
///   Status:   OPEN
///   ...
///   Description:
///     ...
///   Summary:
///     ...
pub fn write_terminal_report<W: Write>(report: &Report, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!("═══ Pull request summaries for {} ═══", report.repository).cyan().bold()
    )?;
    writeln!(out)?;

    if report.entries.is_empty() {
        writeln!(out, "  No pull requests to summarize.")?;
        writeln!(out)?;
    }

    for entry in &report.entries {
        writeln!(
            out,
            "{}",
            format!("PR #{}: \"{}\"", entry.number, entry.title).bold()
        )?;
        writeln!(out, "  {:<10}{}", "Repo:", entry.repository)?;
        writeln!(out, "  {:<10}{}", "Author:", entry.author)?;
        writeln!(out, "  {:<10}{}", "Created:", format_date(&entry.created_at))?;
        if let Some(updated) = &entry.updated_at {
            writeln!(out, "  {:<10}{}", "Updated:", format_date(updated))?;
        }
        writeln!(out, "  {:<10}{}", "Status:", colorize_status(&entry.status))?;
        writeln!(out, "  {:<10}{}", "Merged:", if entry.merged { "Yes" } else { "No" })?;
        writeln!(out, "  {:<10}{}", "URL:", entry.url)?;
        if entry.comments > 0 {
            writeln!(out, "  {:<10}{}", "Comments:", entry.comments)?;
        }
        if let Some(description) = &entry.description {
            writeln!(out)?;
            writeln!(out, "  {}", "Description:".blue().bold())?;
            for line in description.lines() {
                writeln!(out, "    {}", line)?;
            }
        }
        writeln!(out)?;
        writeln!(out, "  {}", "Summary:".blue().bold())?;
        for line in entry.summary.lines() {
            if entry.summarized {
                writeln!(out, "    {}", line)?;
            } else {
                writeln!(out, "    {}", line.yellow())?;
            }
        }
        writeln!(out, "{}", "─".repeat(RULE_WIDTH).dimmed())?;
        writeln!(out)?;
    }

    let footer = format!(
        "═══ Summarized {} of {} pull requests ═══",
        report.summarized_count(),
        report.entries.len()
    );
    if report.failed_count() > 0 {
        writeln!(out, "{}", footer.yellow().bold())?;
    } else {
        writeln!(out, "{}", footer.green().bold())?;
    }
    writeln!(out)?;
    Ok(())
}

/// Render the report as markdown:
/// # Pull request summaries for acme/widgets
/// ## PR #10: "Fix bug"
/// **Repository:** acme/widgets | **Author:** alice | **Status:** open | **Created:** ...
pub fn render_markdown(report: &Report) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Pull request summaries for {}\n\n", report.repository));

    for entry in &report.entries {
        md.push_str(&format!("## PR #{}: \"{}\"\n\n", entry.number, entry.title));
        md.push_str(&format!(
            "**Repository:** {} | **Author:** {} | **Status:** {} | **Created:** {}\n\n",
            entry.repository,
            entry.author,
            entry.status,
            format_date(&entry.created_at)
        ));
        md.push_str(&format!("[View on GitHub]({})\n\n", entry.url));
        if let Some(description) = &entry.description {
            md.push_str(&format!("### Description\n\n{}\n\n### Summary\n\n", description));
        }
        if entry.summarized {
            md.push_str(&entry.summary);
            md.push_str("\n\n");
        } else {
            md.push_str(&format!("_{}_\n\n", entry.summary));
        }
    }

    md.push_str(&format!(
        "---\n\nSummarized {} of {} pull requests.\n",
        report.summarized_count(),
        report.entries.len()
    ));
    md
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%B %d, %Y at %I:%M %p").to_string()
}

fn colorize_status(status: &str) -> colored::ColoredString {
    let label = status.to_uppercase();
    match status {
        "open" => label.green().bold(),
        "merged" => label.magenta().bold(),
        _ => label.red().bold(),
    }
}
