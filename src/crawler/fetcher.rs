//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a bounded timeout
//! - Retry with exponential backoff for transient failures, paced per host
//! - Content-Type gating so only HTML reaches the parser
//! - Error classification

use crate::config::{Config, FetcherConfig, UserAgentConfig};
use crate::crawler::limiter::RateLimiter;
use crate::url::extract_host;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Maximum redirect hops followed for a single fetch
const MAX_REDIRECTS: usize = 10;

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Raw page body
        body: Vec<u8>,
    },

    /// Page is not HTML (Content-Type mismatch); the body was not read
    ContentMismatch {
        /// The Content-Type received, empty when the header was missing
        content_type: String,
    },

    /// Non-retryable HTTP status (403, 404, ...)
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Transient failures persisted through every retry
    Exhausted {
        /// Total number of attempts made
        attempts: u32,
        /// Description of the last failure
        last_error: String,
    },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome of a single request
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Final outcome, no further attempt is made
    Done(FetchResult),

    /// Transient failure worth another attempt
    Retry(String),

    /// Failure another attempt cannot fix (redirect loop, unusable request)
    Fatal(String),
}

/// How many times and how patiently transient failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Something that can retrieve pages for a crawl job
///
/// Implementations issue one request per call. Pacing and retries are
/// applied around them by [`fetch_with_retry`], so tests can drive a crawl
/// with an in-memory or deliberately slow site.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Issues a single request for a page
    async fn attempt(&self, url: &Url) -> Attempt;

    /// Fetches a robots.txt file once, without retries
    ///
    /// Returns None when the file is missing or unreachable.
    async fn fetch_robots(&self, _url: &Url) -> Option<String> {
        None
    }
}

/// Fetches a page, retrying transient failures
///
/// Every attempt, retries included, first takes a permit from `limiter`
/// for the URL's host, so a short backoff never brings two requests to one
/// host closer than the configured interval.
///
/// # Arguments
///
/// * `fetcher` - Issues the individual requests
/// * `limiter` - The job's rate limiter
/// * `url` - The page to fetch
/// * `policy` - Retry budget and backoff
///
/// # Returns
///
/// The outcome of the last attempt, or `FetchResult::Exhausted` when every
/// attempt failed transiently
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    limiter: &RateLimiter,
    url: &Url,
    policy: RetryPolicy,
) -> FetchResult {
    let host = extract_host(url).unwrap_or_default();
    let max_attempts = policy.max_attempts();
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = backoff_delay(policy.backoff, attempt - 1);
            debug!(
                "Retrying {} in {:?} (attempt {}/{}): {}",
                url, delay, attempt, max_attempts, last_error
            );
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let _permit = limiter.acquire(&host).await;
            fetcher.attempt(url).await
        };

        match outcome {
            Attempt::Done(result) => return result,
            Attempt::Fatal(error) => {
                return FetchResult::Exhausted {
                    attempts: attempt,
                    last_error: error,
                }
            }
            Attempt::Retry(error) => last_error = error,
        }
    }

    FetchResult::Exhausted {
        attempts: max_attempts,
        last_error,
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_trawl::config::UserAgentConfig;
/// use sumi_trawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiTrawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true for Content-Type values the parser accepts
///
/// Parameters such as `charset` are ignored and the comparison is
/// case-insensitive.
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

/// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let factor = 1u32 << retry.saturating_sub(1).min(16);
    base.saturating_mul(factor)
}

/// Statuses worth another attempt
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// reqwest-backed fetcher used for real crawls
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher from the `[fetcher]` and `[user-agent]` settings
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.fetcher.timeout())?;
        Ok(Self::with_client(client))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    /// Issues one GET and classifies the response
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | 2xx HTML | Done(Success) |
    /// | 2xx other type | Done(ContentMismatch), body not read |
    /// | HTTP 5xx, 408, 429 | Retry |
    /// | Timeout, connect, transport or body read error | Retry |
    /// | Other HTTP status | Done(HttpError) |
    /// | Redirect loop or too many hops | Fatal |
    async fn attempt(&self, url: &Url) -> Attempt {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_redirect() || e.is_builder() => {
                return Attempt::Fatal(describe_error(&e));
            }
            Err(e) => return Attempt::Retry(describe_error(&e)),
        };

        let status = response.status();
        trace!("GET {} -> {}", url, status);

        if status.is_success() {
            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !is_html_content_type(&content_type) {
                return Attempt::Done(FetchResult::ContentMismatch { content_type });
            }

            return match response.bytes().await {
                Ok(body) => Attempt::Done(FetchResult::Success {
                    final_url,
                    status_code: status.as_u16(),
                    content_type,
                    body: body.to_vec(),
                }),
                Err(e) => Attempt::Retry(format!("failed to read body: {}", describe_error(&e))),
            };
        }

        if is_retryable_status(status) {
            return Attempt::Retry(format!("HTTP {}", status.as_u16()));
        }

        Attempt::Done(FetchResult::HttpError {
            status_code: status.as_u16(),
        })
    }

    async fn fetch_robots(&self, url: &Url) -> Option<String> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("robots.txt fetch failed for {}: {}", url, describe_error(&e));
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("robots.txt for {} returned {}", url, response.status());
            return None;
        }

        response.text().await.ok()
    }
}
