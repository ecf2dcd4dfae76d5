//! Storage traits and error types
//!
//! This module defines the trait interface for job store backends and
//! associated error types.

use crate::state::JobStatus;
use crate::storage::{CrawlJob, CrawledPage, JobId, PageRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for job store implementations
///
/// The crawl engine only ever calls the three write operations; the read
/// and retention operations serve the CLI and other outer collaborators.
/// Implementations must be safe to share between the workers of many
/// concurrent jobs.
pub trait JobStore: Send + Sync {
    // ===== Engine Write Contract =====

    /// Creates a new job in the `PENDING` state
    ///
    /// # Arguments
    ///
    /// * `seed_url` - The seed URL the job starts from
    ///
    /// # Returns
    ///
    /// The identity of the newly created job
    fn create_job(&self, seed_url: &str) -> StorageResult<JobId>;

    /// Records a status change for a job
    ///
    /// Moving to a terminal status also stamps the job's finish time.
    fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Appends a crawled page to its job
    fn append_page(&self, page: &CrawledPage) -> StorageResult<()>;

    // ===== Read Side =====

    /// Gets a job by ID
    fn get_job(&self, job_id: JobId) -> StorageResult<Option<CrawlJob>>;

    /// Lists jobs, newest first
    fn list_jobs(&self, limit: u32, offset: u32) -> StorageResult<Vec<CrawlJob>>;

    /// Lists a job's pages in the order they were recorded
    fn list_pages(&self, job_id: JobId, offset: u32, limit: u32) -> StorageResult<Vec<PageRecord>>;

    /// Counts the pages recorded for a job
    fn count_pages(&self, job_id: JobId) -> StorageResult<u64>;

    // ===== Retention =====

    /// Deletes jobs created before `cutoff`, together with their pages
    ///
    /// # Returns
    ///
    /// The number of jobs deleted
    fn delete_jobs_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}
