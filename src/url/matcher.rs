/// Checks if a host matches a scope pattern
///
/// Two pattern forms are supported:
/// 1. Exact: `"example.com"` matches only `"example.com"`
/// 2. Subdomain wildcard: `"*.example.com"` matches the bare host and any
///    host below it, at any nesting level
///
/// Both sides are expected to be lowercase already.
///
/// # Examples
///
/// ```
/// use sumi_trawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "docs.example.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}
