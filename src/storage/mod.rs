//! Storage module for persisting crawl jobs
//!
//! This module is the job store boundary:
//! - The write contract the crawl engine uses (create job, set status, append page)
//! - Read access for listing jobs and paging through their pages
//! - Retention cleanup, run independently of any crawl

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{JobStore, StorageError, StorageResult};

use crate::state::JobStatus;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::Path;

/// Opaque identity of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A crawl job as recorded in the store
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub id: JobId,
    pub seed_url: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// A page produced by a worker after a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledPage {
    pub job_id: JobId,
    pub url: String,
    /// Absent when the page had no title or could not be parsed
    pub title: Option<String>,
    /// Link distance from the seed (seed is 0)
    pub depth: u32,
}

/// A stored page row
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub job_id: JobId,
    pub url: String,
    pub title: Option<String>,
    pub depth: u32,
    pub crawled_at: DateTime<Utc>,
}

/// Initializes or opens a job store database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Deletes jobs older than the retention window, pages included
///
/// This is the cleanup collaborator: it runs against the store on its own
/// schedule and is never invoked by the crawl engine.
///
/// # Returns
///
/// The number of jobs removed
pub fn purge_expired(store: &dyn JobStore, retention_days: u32) -> StorageResult<u64> {
    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let deleted = store.delete_jobs_older_than(cutoff)?;
    tracing::info!(
        "Purged {} job(s) created before {} ({} day retention)",
        deleted,
        cutoff.to_rfc3339(),
        retention_days
    );
    Ok(deleted)
}
