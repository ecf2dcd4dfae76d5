use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Trawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Crawl behavior configuration, applied to every job
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent workers per job
    pub workers: u32,

    /// Default maximum link depth from the seed (seed is depth 0)
    pub max_depth: u32,

    /// Default maximum number of pages recorded per job
    pub max_pages: u32,

    /// Per-host request rate ceiling
    pub requests_per_second: f64,

    /// Optional cap on simultaneous requests across all hosts of a job
    pub max_concurrent_requests: Option<u32>,

    /// Whether robots.txt Disallow directives are honoured
    pub respect_robots: bool,

    /// Whether subdomains of the seed host are in scope
    pub include_subdomains: bool,
}

impl CrawlerConfig {
    /// Minimum spacing between two requests to the same host
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_depth: 2,
            max_pages: 1000,
            requests_per_second: 1.0,
            max_concurrent_requests: None,
            respect_robots: true,
            include_subdomains: false,
        }
    }
}

/// HTTP fetch behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetcherConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Base delay of the exponential backoff between retries (milliseconds)
    pub retry_backoff_ms: u64,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite job store
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./trawl.db".to_string(),
        }
    }
}

/// Job retention configuration for the cleanup pass
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Jobs older than this many days are purged by `--cleanup`
    #[serde(rename = "retention-days")]
    pub retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { retention_days: 7 }
    }
}
