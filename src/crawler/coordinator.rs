//! Crawl engine - job orchestration logic
//!
//! This module owns the lifecycle of crawl jobs:
//! - Validating submissions and creating the job record
//! - Seeding a per-job frontier and dispatching a pool of workers
//! - The worker loop: robots check, pacing, fetch, parse, persist, enqueue
//! - Driving the job state machine to its terminal status

use crate::config::Config;
use crate::crawler::fetcher::{fetch_with_retry, Fetch, FetchResult, HttpFetcher, RetryPolicy};
use crate::crawler::frontier::{CrawlTask, Frontier};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::parser::{parse_page, ParsedPage};
use crate::robots::RobotsCache;
use crate::state::JobStatus;
use crate::storage::{CrawledPage, JobId, JobStore};
use crate::url::{normalize_url, CrawlScope};
use crate::{Result, TrawlError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

/// Persisted pages between two progress log lines
const PROGRESS_INTERVAL: usize = 25;

/// A request to crawl one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub seed_url: String,
    /// Overrides `crawler.max-depth`
    pub max_depth: Option<u32>,
    /// Overrides `crawler.max-pages`
    pub max_pages: Option<u32>,
}

impl CrawlRequest {
    pub fn new(seed_url: impl Into<String>) -> Self {
        Self {
            seed_url: seed_url.into(),
            max_depth: None,
            max_pages: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Checks the request and returns its canonical seed URL
    ///
    /// # Returns
    ///
    /// * `Ok(Url)` - The seed is an absolute http(s) URL and the overrides are usable
    /// * `Err(TrawlError)` - The seed or the page cap override is invalid
    pub fn validate(&self) -> Result<Url> {
        let seed = normalize_url(self.seed_url.trim())?;

        if self.max_pages == Some(0) {
            return Err(TrawlError::InvalidRequest(
                "max_pages must be at least 1".to_string(),
            ));
        }

        Ok(seed)
    }
}

/// Outcome of a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub pages_persisted: usize,
    pub pages_skipped: usize,
    pub error: Option<String>,
}

/// Handle to a running job
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    handle: JoinHandle<JobSummary>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Waits for the job to reach a terminal status
    pub async fn wait(self) -> Result<JobSummary> {
        let job_id = self.job_id;
        self.handle
            .await
            .map_err(|_| TrawlError::JobAborted(job_id))
    }
}

/// Why a task ended without a persisted page
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkipReason {
    #[error("unreachable after {attempts} attempt(s): {last_error}")]
    Unreachable { attempts: u32, last_error: String },

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("not HTML (content type '{0}')")]
    NotHtml(String),

    #[error("disallowed by robots.txt")]
    Disallowed,

    #[error("redirected out of scope to {0}")]
    OutOfScope(String),

    #[error("job store rejected the page: {0}")]
    Store(String),
}

/// In-memory owner of a job's status
///
/// Every change goes through `JobStatus::transition`, so a terminal job can
/// never move again. The store is told about each accepted change.
#[derive(Debug)]
pub struct JobTracker {
    job_id: JobId,
    status: Mutex<JobStatus>,
}

impl JobTracker {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: Mutex::new(JobStatus::Pending),
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves the job to `next` and records it in the store
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The move was legal; a failed store write is only logged
    /// * `Err(TrawlError::InvalidTransition)` - The move was rejected
    pub fn transition(
        &self,
        store: &dyn JobStore,
        next: JobStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        *status = status.transition(next)?;

        if let Err(e) = store.set_status(self.job_id, next, error) {
            tracing::warn!("Job {}: failed to record status {}: {}", self.job_id, next, e);
        }
        Ok(())
    }
}

/// Shared state of one running job
struct JobContext {
    job_id: JobId,
    max_depth: u32,
    frontier: Frontier,
    limiter: RateLimiter,
    retry: RetryPolicy,
    robots: Option<RobotsCache>,
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn JobStore>,
    seed_failure: Mutex<Option<String>>,
    persisted: AtomicUsize,
    skipped: AtomicUsize,
}

impl JobContext {
    /// Processes one claimed task
    async fn visit(&self, task: &CrawlTask) -> std::result::Result<(), SkipReason> {
        if let Some(robots) = &self.robots {
            if !robots
                .is_allowed(self.fetcher.as_ref(), &self.limiter, &task.url)
                .await
            {
                return Err(SkipReason::Disallowed);
            }
        }

        let fetched =
            fetch_with_retry(self.fetcher.as_ref(), &self.limiter, &task.url, self.retry).await;

        let (final_url, content_type, body) = match fetched {
            FetchResult::Success {
                final_url,
                content_type,
                body,
                ..
            } => (final_url, content_type, body),
            FetchResult::ContentMismatch { content_type } => {
                return Err(SkipReason::NotHtml(content_type))
            }
            FetchResult::HttpError { status_code } => {
                return Err(SkipReason::HttpStatus(status_code))
            }
            FetchResult::Exhausted {
                attempts,
                last_error,
            } => {
                return Err(SkipReason::Unreachable {
                    attempts,
                    last_error,
                })
            }
        };

        if !self.frontier.scope().contains(&final_url) {
            return Err(SkipReason::OutOfScope(final_url.to_string()));
        }

        let parsed = parse_page(&body, &content_type, &final_url).unwrap_or_else(|e| {
            tracing::debug!("Job {}: {} parsed without title or links: {}", self.job_id, task.url, e);
            ParsedPage::default()
        });

        let page = CrawledPage {
            job_id: self.job_id,
            url: task.url.to_string(),
            title: parsed.title,
            depth: task.depth,
        };
        self.store
            .append_page(&page)
            .map_err(|e| SkipReason::Store(e.to_string()))?;

        let persisted = self.persisted.fetch_add(1, Ordering::SeqCst) + 1;
        if persisted % PROGRESS_INTERVAL == 0 {
            tracing::info!(
                "Job {} progress: {} pages persisted, {} URLs admitted",
                self.job_id,
                persisted,
                self.frontier.visited_count()
            );
        }

        if task.depth < self.max_depth {
            for link in &parsed.links {
                let admission = self.frontier.push(link, task.depth + 1);
                tracing::trace!("Job {}: {} -> {:?}", self.job_id, link, admission);
            }
        }

        Ok(())
    }

    fn record_skip(&self, task: &CrawlTask, reason: &SkipReason) {
        self.frontier.release_slot();
        self.skipped.fetch_add(1, Ordering::SeqCst);

        if task.depth == 0 {
            let message = format!("seed {} could not be crawled: {}", task.url, reason);
            tracing::warn!("Job {}: {}", self.job_id, message);
            *self.seed_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
        } else {
            tracing::warn!("Job {}: skipped {}: {}", self.job_id, task.url, reason);
        }
    }

    fn take_seed_failure(&self) -> Option<String> {
        self.seed_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

async fn worker_loop(ctx: Arc<JobContext>, worker_id: usize) {
    while let Some(task) = ctx.frontier.pop().await {
        tracing::debug!(
            "Job {} worker {}: visiting {} (depth {})",
            ctx.job_id,
            worker_id,
            task.url,
            task.depth
        );

        if let Err(reason) = ctx.visit(&task).await {
            ctx.record_skip(&task, &reason);
        }
    }
    tracing::debug!("Job {} worker {}: frontier exhausted", ctx.job_id, worker_id);
}

/// Runs crawl jobs against a job store
///
/// Cloning is cheap; every clone submits into the same store. Each job gets
/// its own frontier, visited set, rate limiter and robots cache.
#[derive(Clone)]
pub struct CrawlEngine {
    config: Arc<Config>,
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn Fetch>,
}

impl CrawlEngine {
    /// Creates an engine around an explicit fetcher
    pub fn new(config: Arc<Config>, store: Arc<dyn JobStore>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            config,
            store,
            fetcher,
        }
    }

    /// Creates an engine that fetches over HTTP
    pub fn with_http_fetcher(config: Arc<Config>, store: Arc<dyn JobStore>) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(config, store, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validates a request, creates its job and starts crawling
    ///
    /// Returns as soon as the job exists in the store (status `PENDING`);
    /// the crawl itself runs on the tokio runtime.
    ///
    /// # Returns
    ///
    /// * `Ok(JobHandle)` - The job was created and started
    /// * `Err(TrawlError)` - The request was invalid or the job could not be created
    pub fn submit(&self, request: CrawlRequest) -> Result<JobHandle> {
        let seed = request.validate()?;

        let crawler = &self.config.crawler;
        let max_depth = request.max_depth.unwrap_or(crawler.max_depth);
        let max_pages = request.max_pages.unwrap_or(crawler.max_pages);
        let scope = CrawlScope::from_seed(&seed, crawler.include_subdomains)?;

        let job_id = self.store.create_job(seed.as_str())?;
        tracing::info!(
            "Job {} created for {} (max depth {}, max pages {})",
            job_id,
            seed,
            max_depth,
            max_pages
        );

        let ctx = Arc::new(JobContext {
            job_id,
            max_depth,
            frontier: Frontier::new(scope, max_depth, max_pages as usize),
            limiter: RateLimiter::from_config(crawler),
            retry: RetryPolicy::from_config(&self.config.fetcher),
            robots: crawler
                .respect_robots
                .then(|| RobotsCache::new(self.config.user_agent.crawler_name.clone())),
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
            seed_failure: Mutex::new(None),
            persisted: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        });

        let handle = tokio::spawn(run_job(ctx, seed, crawler.workers as usize));
        Ok(JobHandle { job_id, handle })
    }

    /// Validates every request, then starts them all
    ///
    /// No job is created unless every request is valid. If the store fails
    /// part way through, the jobs already started are awaited before the
    /// error is returned, so each of them still ends in a terminal status.
    pub async fn submit_all(&self, requests: Vec<CrawlRequest>) -> Result<Vec<JobHandle>> {
        for request in &requests {
            request.validate().map_err(|e| {
                TrawlError::InvalidRequest(format!("seed {}: {}", request.seed_url, e))
            })?;
        }

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            match self.submit(request) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        if let Ok(summary) = handle.wait().await {
                            tracing::info!("Job {} ended {}", summary.job_id, summary.status);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    /// Submits a request and waits for its outcome
    pub async fn crawl(&self, request: CrawlRequest) -> Result<JobSummary> {
        self.submit(request)?.wait().await
    }
}

async fn run_job(ctx: Arc<JobContext>, seed: Url, workers: usize) -> JobSummary {
    let job_id = ctx.job_id;
    let tracker = JobTracker::new(job_id);
    let started = Instant::now();

    let admission = ctx.frontier.push(&seed, 0);
    if !admission.is_admitted() {
        *ctx.seed_failure.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(format!("seed {} was not admitted: {:?}", seed, admission));
    }

    if let Err(e) = tracker.transition(ctx.store.as_ref(), JobStatus::InProgress, None) {
        tracing::error!("Job {}: {}", job_id, e);
    }

    let mut pool = JoinSet::new();
    for worker_id in 0..workers.max(1) {
        pool.spawn(worker_loop(ctx.clone(), worker_id));
    }
    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Job {}: worker ended abnormally: {}", job_id, e);
        }
    }

    let error = ctx.take_seed_failure();
    let status = if error.is_some() {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };

    if let Err(e) = tracker.transition(ctx.store.as_ref(), status, error.as_deref()) {
        tracing::error!("Job {}: {}", job_id, e);
    }

    let summary = JobSummary {
        job_id,
        status: tracker.status(),
        pages_persisted: ctx.persisted.load(Ordering::SeqCst),
        pages_skipped: ctx.skipped.load(Ordering::SeqCst),
        error,
    };

    tracing::info!(
        "Job {} {}: {} page(s) persisted, {} skipped in {:.1}s",
        job_id,
        summary.status,
        summary.pages_persisted,
        summary.pages_skipped,
        started.elapsed().as_secs_f64()
    );

    summary
}
