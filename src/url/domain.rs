use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_trawl::url::extract_host;
///
/// let url = Url::parse("https://Blog.Example.com:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Host used for scope comparisons: lowercase with a leading `www.` removed
pub fn scope_host(url: &Url) -> Option<String> {
    extract_host(url).map(|host| match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    })
}
