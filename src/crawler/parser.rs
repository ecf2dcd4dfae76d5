//! HTML parser for extracting the title and links of a page
//!
//! Parsing is a pure function of the body, its content type and the URL it
//! was served from.

use crate::crawler::fetcher::is_html_content_type;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Schemes whose links are never followed
const IGNORED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Reasons a fetched body yields no title or links
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("body is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// The page title (from the first <title> tag)
    pub title: Option<String>,

    /// Outbound links, absolute, http(s) only, in document order without duplicates
    pub links: Vec<Url>,
}

/// Parses a page body and extracts its title and links
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links (same page anchors)
/// - Anything that is not http(s) after resolution
///
/// Relative links resolve against `<base href>` when the document has one,
/// otherwise against `base`.
///
/// # Arguments
///
/// * `body` - The raw response body
/// * `content_type` - The response Content-Type
/// * `base` - The URL the page was served from (after redirects)
///
/// # Returns
///
/// * `Ok(ParsedPage)` - Successfully parsed page
/// * `Err(ParseError)` - Body is not UTF-8 or not HTML
///
/// # Example
///
/// ```
/// use sumi_trawl::crawler::parse_page;
/// use url::Url;
///
/// let html = br#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, "text/html", &base).unwrap();
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_page(body: &[u8], content_type: &str, base: &Url) -> Result<ParsedPage, ParseError> {
    if !is_html_content_type(content_type) {
        return Err(ParseError::UnsupportedContentType(content_type.to_string()));
    }

    let html = std::str::from_utf8(body)?;
    Ok(parse_html(html, base))
}

/// Parses an HTML document that is already decoded
pub fn parse_html(html: &str, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, base);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, &base),
    }
}

/// Extracts the page title with inner whitespace collapsed
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| {
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty())
}

/// Resolves the effective base URL, honouring `<base href>`
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .filter(|base| base.scheme() == "http" || base.scheme() == "https")
        .unwrap_or_else(|| page_url.clone())
}

fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |element: ElementRef<'_>| {
        if let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base))
        {
            if seen.insert(url.as_str().to_string()) {
                links.push(url);
            }
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        document
            .select(&a_selector)
            .filter(|element| element.value().attr("download").is_none())
            .for_each(&mut push);
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        document.select(&canonical_selector).for_each(&mut push);
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if IGNORED_SCHEMES
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    fn parse(html: &str) -> ParsedPage {
        parse_page(html.as_bytes(), "text/html; charset=utf-8", &base_url()).unwrap()
    }

    fn link_strings(page: &ParsedPage) -> Vec<&str> {
        page.links.iter().map(Url::as_str).collect()
    }

    #[test]
    fn test_extract_title() {
        let parsed = parse("<html><head><title>Test Page</title></head></html>");
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_title_whitespace_collapsed() {
        let parsed = parse("<title>\n  Multi\n\t line   title  </title>");
        assert_eq!(parsed.title, Some("Multi line title".to_string()));
    }

    #[test]
    fn test_missing_or_empty_title() {
        assert_eq!(parse("<html><body>No title</body></html>").title, None);
        assert_eq!(parse("<title>   </title>").title, None);
    }

    #[test]
    fn test_first_title_wins() {
        let parsed = parse("<title>First</title><svg><title>Second</title></svg>");
        assert_eq!(parsed.title, Some("First".to_string()));
    }

    #[test]
    fn test_relative_and_absolute_links() {
        let parsed = parse(
            r#"<a href="/root">a</a>
               <a href="sibling">b</a>
               <a href="../up">c</a>
               <a href="https://other.org/x">d</a>"#,
        );
        assert_eq!(
            link_strings(&parsed),
            vec![
                "https://example.com/root",
                "https://example.com/dir/sibling",
                "https://example.com/up",
                "https://other.org/x",
            ]
        );
    }

    #[test]
    fn test_excluded_links() {
        let parsed = parse(
            r##"<a href="javascript:void(0)">js</a>
               <a href="JavaScript:alert(1)">js2</a>
               <a href="mailto:a@example.com">mail</a>
               <a href="tel:+123">tel</a>
               <a href="data:text/html,hi">data</a>
               <a href="#section">frag</a>
               <a href="ftp://example.com/file">ftp</a>
               <a href="/file.zip" download>dl</a>
               <a href="   ">blank</a>
               <a>no href</a>
               <link rel="stylesheet" href="/style.css">
               <img src="/img.png">
               <a href="/kept">kept</a>"##,
        );
        assert_eq!(link_strings(&parsed), vec!["https://example.com/kept"]);
    }

    #[test]
    fn test_canonical_link_included() {
        let parsed = parse(
            r#"<head><link rel="canonical" href="https://example.com/canonical"></head>"#,
        );
        assert_eq!(link_strings(&parsed), vec!["https://example.com/canonical"]);
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let parsed = parse(r#"<a href="/b">1</a><a href="/a">2</a><a href="/b">3</a>"#);
        assert_eq!(
            link_strings(&parsed),
            vec!["https://example.com/b", "https://example.com/a"]
        );
    }

    #[test]
    fn test_base_href_respected() {
        let parsed = parse(r#"<head><base href="https://cdn.example.com/docs/"></head><a href="intro">x</a>"#);
        assert_eq!(
            link_strings(&parsed),
            vec!["https://cdn.example.com/docs/intro"]
        );
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let body = [0x3c, 0x74, 0xff, 0xfe, 0x3e];
        let result = parse_page(&body, "text/html", &base_url());
        assert!(matches!(result, Err(ParseError::Encoding(_))));
    }

    #[test]
    fn test_non_html_content_type_rejected() {
        let result = parse_page(b"{}", "application/json", &base_url());
        assert!(matches!(
            result,
            Err(ParseError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn test_malformed_html_still_parses() {
        let parsed = parse("<title>Broken<a href='/x'>unclosed");
        assert!(parsed.title.is_some());
    }
}
