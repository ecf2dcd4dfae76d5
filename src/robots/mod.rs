//! Robots.txt handling module
//!
//! This module provides parsing of robots.txt files and a per-job cache that
//! fetches each host's file once. Only Disallow/Allow directives are honoured.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;

use url::Url;

/// Builds the robots.txt location for the host serving `url`
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_trawl::robots::robots_url;
///
/// let url = Url::parse("http://example.com:8080/docs/page?x=1").unwrap();
/// assert_eq!(
///     robots_url(&url).unwrap().as_str(),
///     "http://example.com:8080/robots.txt"
/// );
/// ```
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}
