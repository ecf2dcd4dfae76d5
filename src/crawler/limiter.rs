//! Request pacing for a crawl job
//!
//! This module handles:
//! - Per-host minimum spacing between requests
//! - An optional cap on simultaneous requests across all hosts
//!
//! Acquisition never fails; it only delays the caller.

use crate::config::CrawlerConfig;
use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Held for the duration of one request
///
/// Releases the global concurrency slot (if any) when dropped.
#[derive(Debug)]
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Per-job rate limiter
pub struct RateLimiter {
    /// Minimum spacing between requests to one host
    interval: Duration,

    /// Per-host pacing state
    hosts: Mutex<HashMap<String, HostState>>,

    /// Global semaphore for limiting concurrent requests
    global: Option<Arc<Semaphore>>,
}

impl RateLimiter {
    /// Creates a new rate limiter
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum time between two requests to the same host
    /// * `max_concurrent` - Optional cap on simultaneous requests
    pub fn new(interval: Duration, max_concurrent: Option<u32>) -> Self {
        Self {
            interval,
            hosts: Mutex::new(HashMap::new()),
            global: max_concurrent.map(|n| Arc::new(Semaphore::new(n as usize))),
        }
    }

    /// Creates a rate limiter from the `[crawler]` settings
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.min_request_interval(), config.max_concurrent_requests)
    }

    /// Waits until a request to `host` may be issued
    ///
    /// The global slot (if any) is taken before the host slot is reserved,
    /// so two grants to one host are always at least `interval` apart even
    /// when callers queue on the global cap. Slots for one host are granted
    /// in the order callers reserve them.
    pub async fn acquire(&self, host: &str) -> RatePermit {
        let permit = match &self.global {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        let slot = {
            let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
            hosts
                .entry(host.to_string())
                .or_default()
                .reserve(Instant::now(), self.interval)
        };

        let now = Instant::now();
        if slot > now {
            trace!("Pacing {} for {:?}", host, slot - now);
            tokio::time::sleep_until(tokio::time::Instant::from_std(slot)).await;
        }

        RatePermit { _permit: permit }
    }

    /// Number of requests granted to `host` so far
    #[cfg(test)]
    fn request_count(&self, host: &str) -> u32 {
        let hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts.get(host).map(|s| s.request_count).unwrap_or(0)
    }
}
