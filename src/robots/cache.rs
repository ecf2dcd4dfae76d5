//! Per-job robots.txt cache
//!
//! Each host's robots.txt is fetched at most once per job. Workers that need
//! the same host while the fetch is running wait for that fetch instead of
//! issuing their own. The fetch is paced by the job's rate limiter like any
//! other request to the host.

use crate::crawler::{Fetch, RateLimiter};
use crate::url::extract_host;
use crate::robots::{robots_url, ParsedRobots};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

type Slot = Arc<OnceCell<Arc<ParsedRobots>>>;

/// Robots.txt rules of every host a job has touched
pub struct RobotsCache {
    /// Product token matched against `User-agent` groups
    agent: String,
    hosts: Mutex<HashMap<String, Slot>>,
}

impl RobotsCache {
    /// Creates an empty cache for the given crawler product token
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Checks a URL against its host's robots.txt, fetching it on first use
    ///
    /// A robots.txt that cannot be retrieved allows everything.
    pub async fn is_allowed(
        &self,
        fetcher: &dyn Fetch,
        limiter: &RateLimiter,
        url: &Url,
    ) -> bool {
        let rules = self.rules_for(fetcher, limiter, url).await;
        rules.is_allowed(url.as_str(), &self.agent)
    }

    async fn rules_for(
        &self,
        fetcher: &dyn Fetch,
        limiter: &RateLimiter,
        url: &Url,
    ) -> Arc<ParsedRobots> {
        let origin = url.origin().ascii_serialization();

        let slot = {
            let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
            hosts.entry(origin.clone()).or_default().clone()
        };

        slot.get_or_init(|| async {
            let parsed = match robots_url(url) {
                Some(target) => {
                    let host = extract_host(url).unwrap_or_default();
                    let body = {
                        let _permit = limiter.acquire(&host).await;
                        fetcher.fetch_robots(&target).await
                    };
                    match body {
                        Some(body) => ParsedRobots::from_content(&body),
                        None => ParsedRobots::allow_all(),
                    }
                }
                None => ParsedRobots::allow_all(),
            };
            debug!(
                "robots.txt for {}: {}",
                origin,
                if parsed.is_allow_all() {
                    "allow all"
                } else {
                    "rules loaded"
                }
            );
            Arc::new(parsed)
        })
        .await
        .clone()
    }

    /// Number of hosts whose robots.txt has been resolved
    #[cfg(test)]
    fn resolved_hosts(&self) -> usize {
        let hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts.values().filter(|slot| slot.initialized()).count()
    }
}
