//! Output module for human-readable job listings and reports
//!
//! This module handles:
//! - Listing recent jobs with their status
//! - Per-job reports with a paginated view of crawled pages

mod report;

pub use report::{
    format_job_report, load_job_report, print_job_report, JobReport, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};

use crate::storage::CrawlJob;
use std::fmt::Write;

/// Formats a table of jobs, one line per job
///
/// # Arguments
///
/// * `jobs` - The jobs to list, in display order
///
/// # Returns
///
/// The table as text, or a short notice when there are no jobs
pub fn format_job_list(jobs: &[CrawlJob]) -> String {
    if jobs.is_empty() {
        return "No crawl jobs found\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:<11}  {:<20}  SEED",
        "ID", "STATUS", "CREATED"
    );
    for job in jobs {
        let _ = writeln!(
            out,
            "{:>6}  {:<11}  {:<20}  {}",
            job.id,
            job.status.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            job.seed_url
        );
        if let Some(error) = &job.error_message {
            let _ = writeln!(out, "{:>6}  error: {}", "", error);
        }
    }
    out
}

/// Prints a table of jobs to stdout
pub fn print_job_list(jobs: &[CrawlJob]) {
    print!("{}", format_job_list(jobs));
}

/// Formats a duration in seconds as e.g. "1h 2m 3s"
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
