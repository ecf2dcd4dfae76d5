//! Crawler module for running crawl jobs
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - HTML parsing and link extraction
//! - The per-job frontier and request pacing
//! - Job orchestration and the worker pool

mod coordinator;
mod fetcher;
mod frontier;
mod limiter;
mod parser;

pub use coordinator::{
    CrawlEngine, CrawlRequest, JobHandle, JobSummary, JobTracker, SkipReason,
};
pub use fetcher::{
    backoff_delay, build_http_client, fetch_with_retry, is_html_content_type, Attempt, Fetch,
    FetchResult, HttpFetcher, RetryPolicy,
};
pub use frontier::{Admission, Claimed, CrawlTask, Frontier};
pub use limiter::{RateLimiter, RatePermit};
pub use parser::{parse_html, parse_page, ParseError, ParsedPage};
