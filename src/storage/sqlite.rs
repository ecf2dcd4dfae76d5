//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use crate::storage::{CrawlJob, CrawledPage, JobId, PageRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite job store backend
///
/// A single connection is shared behind a mutex so that the workers of every
/// running job can append pages through `&self`.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

/// Columns of `crawl_jobs` exactly as stored
struct JobRow {
    id: i64,
    seed_url: String,
    status: String,
    created_at: String,
    finished_at: Option<String>,
    error_message: Option<String>,
}

impl JobRow {
    const COLUMNS: &'static str = "id, seed_url, status, created_at, finished_at, error_message";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seed_url: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
            finished_at: row.get(4)?,
            error_message: row.get(5)?,
        })
    }

    fn into_job(self) -> StorageResult<CrawlJob> {
        let status = JobStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Corrupt(format!("job {} has unknown status '{}'", self.id, self.status))
        })?;

        Ok(CrawlJob {
            id: JobId(self.id),
            seed_url: self.seed_url,
            status,
            created_at: parse_timestamp(&self.created_at)?,
            finished_at: self.finished_at.as_deref().map(parse_timestamp).transpose()?,
            error_message: self.error_message,
        })
    }
}

/// Formats a timestamp with a fixed width so stored values sort chronologically
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp '{}': {}", raw, e)))
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_job(&self, seed_url: &str, created_at: DateTime<Utc>) -> StorageResult<JobId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO crawl_jobs (seed_url, status, created_at) VALUES (?1, ?2, ?3)",
            params![
                seed_url,
                JobStatus::Pending.to_db_string(),
                format_timestamp(created_at)
            ],
        )?;
        Ok(JobId(conn.last_insert_rowid()))
    }
}

impl JobStore for SqliteStorage {
    // ===== Engine Write Contract =====

    fn create_job(&self, seed_url: &str) -> StorageResult<JobId> {
        self.insert_job(seed_url, Utc::now())
    }

    fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let finished_at = status.is_terminal().then(|| format_timestamp(Utc::now()));

        let updated = self.conn().execute(
            "UPDATE crawl_jobs SET status = ?1, error_message = ?2, finished_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), error_message, finished_at, job_id.0],
        )?;

        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn append_page(&self, page: &CrawledPage) -> StorageResult<()> {
        let result = self.conn().execute(
            "INSERT INTO crawled_pages (job_id, url, title, depth, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                page.job_id.0,
                page.url,
                page.title,
                page.depth,
                format_timestamp(Utc::now())
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::ConstraintViolation(msg.unwrap_or_else(|| {
                    format!("page {} rejected for job {}", page.url, page.job_id)
                })))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ===== Read Side =====

    fn get_job(&self, job_id: JobId) -> StorageResult<Option<CrawlJob>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM crawl_jobs WHERE id = ?1", JobRow::COLUMNS),
                params![job_id.0],
                JobRow::from_row,
            )
            .optional()?;

        row.map(JobRow::into_job).transpose()
    }

    fn list_jobs(&self, limit: u32, offset: u32) -> StorageResult<Vec<CrawlJob>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM crawl_jobs ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                JobRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![limit, offset], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(JobRow::into_job).collect()
    }

    fn list_pages(&self, job_id: JobId, offset: u32, limit: u32) -> StorageResult<Vec<PageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, url, title, depth, crawled_at FROM crawled_pages
             WHERE job_id = ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
        )?;

        let raw = stmt
            .query_map(params![job_id.0, limit, offset], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, job_id, url, title, depth, crawled_at)| {
                Ok(PageRecord {
                    id,
                    job_id: JobId(job_id),
                    url,
                    title,
                    depth,
                    crawled_at: parse_timestamp(&crawled_at)?,
                })
            })
            .collect()
    }

    fn count_pages(&self, job_id: JobId) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM crawled_pages WHERE job_id = ?1",
            params![job_id.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Retention =====

    fn delete_jobs_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let deleted = self.conn().execute(
            "DELETE FROM crawl_jobs WHERE created_at < ?1",
            params![format_timestamp(cutoff)],
        )?;
        Ok(deleted as u64)
    }
}
