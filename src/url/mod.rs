//! URL handling module for Sumi-Trawl
//!
//! This module provides URL canonicalization, host extraction, and the
//! per-job crawl scope that decides which links may be followed.

mod domain;
mod matcher;
mod normalize;

use crate::{UrlError, UrlResult};
use url::Url;

pub use domain::{extract_host, scope_host};
pub use matcher::matches_wildcard;
pub use normalize::{canonicalize, normalize_url};

/// The registrable-domain boundary of a crawl job
///
/// Derived once from the seed URL and immutable for the job's lifetime.
/// Scheme and port are ignored; a leading `www.` on either side is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlScope {
    host: String,
    include_subdomains: bool,
}

impl CrawlScope {
    /// Builds the scope of a job from its seed URL
    ///
    /// # Arguments
    ///
    /// * `seed` - The job's seed URL
    /// * `include_subdomains` - Whether hosts below the seed host are in scope
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlScope)` - Scope bound to the seed's host
    /// * `Err(UrlError::MissingHost)` - The seed has no host
    pub fn from_seed(seed: &Url, include_subdomains: bool) -> UrlResult<Self> {
        let host = scope_host(seed).ok_or(UrlError::MissingHost)?;
        Ok(Self {
            host,
            include_subdomains,
        })
    }

    /// The seed host with any `www.` prefix removed
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns true when the URL may be crawled within this job
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use sumi_trawl::url::CrawlScope;
    ///
    /// let seed = Url::parse("https://www.example.com/").unwrap();
    /// let scope = CrawlScope::from_seed(&seed, false).unwrap();
    ///
    /// assert!(scope.contains(&Url::parse("http://example.com:8080/a").unwrap()));
    /// assert!(!scope.contains(&Url::parse("https://blog.example.com/").unwrap()));
    /// ```
    pub fn contains(&self, url: &Url) -> bool {
        let Some(candidate) = scope_host(url) else {
            return false;
        };

        if self.include_subdomains {
            matches_wildcard(&format!("*.{}", self.host), &candidate)
        } else {
            candidate == self.host
        }
    }
}
