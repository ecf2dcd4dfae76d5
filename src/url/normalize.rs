use crate::UrlError;
use url::{form_urlencoded, Url};

/// Exact-match tracking parameters; any `utm_*` key is also dropped
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Canonicalizes a URL for deduplication within a crawl job
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host and drop default ports (done by the parser)
/// 3. Normalize path:
///    - Collapse repeated slashes
///    - Remove dot segments (. and ..)
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters by key
/// 7. Remove empty query string (trailing ?)
///
/// The scheme and any `www.` prefix are kept: the canonical URL is the one
/// that gets fetched.
///
/// # Arguments
///
/// * `url_str` - The URL string to canonicalize
///
/// # Returns
///
/// * `Ok(Url)` - Canonical URL
/// * `Err(UrlError)` - Failed to parse the URL, or the scheme is not http(s)
///
/// # Examples
///
/// ```
/// use sumi_trawl::url::normalize_url;
///
/// let url = normalize_url("http://Example.COM:80//docs/./intro/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/docs/intro");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Canonicalizes an already parsed URL, see [`normalize_url`]
pub fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    if url.cannot_be_a_base() {
        return Err(UrlError::Malformed(url.to_string()));
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if let Some(query) = url.query() {
        let params = filter_and_sort_query_params(query);
        let query = (!params.is_empty()).then(|| params.join("&"));
        url.set_query(query.as_deref());
    }

    Ok(url)
}

/// Normalizes a URL path by collapsing slashes, resolving dot segments
/// and dropping the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts the rest by key
///
/// Pairs are kept exactly as written, so `?flag` stays `flag` and an
/// unescaped `a/b` is not percent-encoded. The sort is stable, so repeated
/// keys keep their relative order.
fn filter_and_sort_query_params(query: &str) -> Vec<&str> {
    let mut params: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| !is_tracking_param(&decoded_key(pair)))
        .collect();

    params.sort_by_key(|pair| raw_key(pair));

    params
}

fn raw_key(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(key, _)| key)
}

fn decoded_key(pair: &str) -> String {
    form_urlencoded::parse(raw_key(pair).as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
