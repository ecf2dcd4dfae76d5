//! Job report generation from the job store
//!
//! A report is one job's record plus one page of its crawled pages.

use crate::storage::{CrawlJob, JobId, JobStore, PageRecord, StorageError};
use crate::{Result, TrawlError};
use std::fmt::Write;

/// Default number of pages shown per report page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest accepted report page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// One job and a window of its pages
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: CrawlJob,

    /// Pages persisted for the job in total
    pub total_pages: u64,

    /// 1-based index of the window in `pages`
    pub page: u32,

    pub page_size: u32,

    pub pages: Vec<PageRecord>,
}

impl JobReport {
    /// Number of report pages needed to show every crawled page
    pub fn page_count(&self) -> u64 {
        self.total_pages.div_ceil(u64::from(self.page_size)).max(1)
    }
}

/// Loads a job report from storage
///
/// # Arguments
///
/// * `store` - The job store to query
/// * `job_id` - The job to report on
/// * `page` - 1-based report page
/// * `page_size` - Pages per report page, 1 to 100
///
/// # Returns
///
/// * `Ok(JobReport)` - The job and the requested window of pages
/// * `Err(TrawlError)` - Bad paging arguments, unknown job or a storage failure
pub fn load_job_report(
    store: &dyn JobStore,
    job_id: JobId,
    page: u32,
    page_size: u32,
) -> Result<JobReport> {
    if page == 0 {
        return Err(TrawlError::InvalidRequest(
            "page numbers start at 1".to_string(),
        ));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(TrawlError::InvalidRequest(format!(
            "page size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let job = store
        .get_job(job_id)?
        .ok_or(StorageError::JobNotFound(job_id))?;
    let total_pages = store.count_pages(job_id)?;
    let offset = (page - 1).saturating_mul(page_size);
    let pages = store.list_pages(job_id, offset, page_size)?;

    Ok(JobReport {
        job,
        total_pages,
        page,
        page_size,
        pages,
    })
}

/// Formats a job report as plain text
pub fn format_job_report(report: &JobReport) -> String {
    let job = &report.job;
    let mut out = String::new();

    let _ = writeln!(out, "=== Job {} ===\n", job.id);
    let _ = writeln!(out, "  Seed URL: {}", job.seed_url);
    let _ = writeln!(out, "  Status: {}", job.status);
    let _ = writeln!(out, "  Created: {}", job.created_at.to_rfc3339());
    if let Some(finished) = job.finished_at {
        let _ = writeln!(out, "  Finished: {}", finished.to_rfc3339());
        let _ = writeln!(
            out,
            "  Duration: {}",
            super::format_duration((finished - job.created_at).num_seconds())
        );
    }
    if let Some(error) = &job.error_message {
        let _ = writeln!(out, "  Error: {}", error);
    }
    let _ = writeln!(out, "  Pages crawled: {}", report.total_pages);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Pages (page {} of {}, {} per page):",
        report.page,
        report.page_count(),
        report.page_size
    );
    if report.pages.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for page in &report.pages {
        let _ = writeln!(
            out,
            "  [{}] {} - {}",
            page.depth,
            page.url,
            page.title.as_deref().unwrap_or("(no title)")
        );
    }

    out
}

/// Prints a job report to stdout
pub fn print_job_report(report: &JobReport) {
    print!("{}", format_job_report(report));
}
