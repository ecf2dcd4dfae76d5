//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP sites and run whole jobs
//! end-to-end through the HTTP fetcher and a SQLite job store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_trawl::config::Config;
use sumi_trawl::crawler::{Attempt, Fetch, FetchResult};
use sumi_trawl::storage::{JobId, JobStore, SqliteStorage};
use sumi_trawl::{CrawlEngine, CrawlRequest, JobStatus, TrawlError};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration
fn create_test_config(workers: u32, respect_robots: bool) -> Config {
    let toml = format!(
        r#"
[crawler]
workers = {}
max-depth = 2
max-pages = 100
requests-per-second = 1000.0
respect-robots = {}

[fetcher]
timeout-secs = 5
max-retries = 1
retry-backoff-ms = 5

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"
"#,
        workers, respect_robots
    );
    Config::from_toml_str(&toml).expect("test config should be valid")
}

/// Opens a job store in a temporary directory
fn create_test_store() -> (TempDir, Arc<SqliteStorage>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage = SqliteStorage::new(&dir.path().join("trawl.db")).expect("Failed to open store");
    (dir, Arc::new(storage))
}

fn create_engine(config: Config, store: Arc<SqliteStorage>) -> CrawlEngine {
    CrawlEngine::with_http_fetcher(Arc::new(config), store).expect("Failed to build engine")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// Mounts a page that must never be requested
async fn mount_forbidden(server: &MockServer, page_path: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html("<title>Should not be fetched</title>"))
        .expect(0)
        .mount(server)
        .await;
}

/// Paths of every persisted page of a job, sorted
fn persisted_paths(store: &SqliteStorage, job_id: JobId) -> Vec<String> {
    let mut paths: Vec<String> = store
        .list_pages(job_id, 0, 1000)
        .expect("Failed to list pages")
        .into_iter()
        .map(|page| Url::parse(&page.url).unwrap().path().to_string())
        .collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn test_crawl_stays_in_domain() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let external_port = Url::parse(&external.uri()).unwrap().port().unwrap();

    mount_page(
        &site,
        "/",
        &format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="/a">A</a> <a href="/b">B</a> <a href="/c">C</a>
            <a href="http://localhost:{}/ext">External</a>
            </body></html>"#,
            external_port
        ),
    )
    .await;
    mount_page(&site, "/a", "<title>A</title>").await;
    mount_page(&site, "/b", "<title>B</title>").await;
    mount_page(&site, "/c", "<title>C</title>").await;
    mount_forbidden(&external, "/ext").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(4, true), store.clone());

    let summary = engine
        .crawl(
            CrawlRequest::new(format!("{}/", site.uri()))
                .with_max_depth(1)
                .with_max_pages(10),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.pages_persisted, 4);
    assert_eq!(persisted_paths(&store, summary.job_id), vec!["/", "/a", "/b", "/c"]);

    let job = store.get_job(summary.job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.finished_at.is_some());
    assert!(job.error_message.is_none());

    let pages = store.list_pages(summary.job_id, 0, 10).unwrap();
    let home = pages.iter().find(|p| p.depth == 0).unwrap();
    assert_eq!(home.title.as_deref(), Some("Home"));
}

#[tokio::test]
async fn test_seed_server_error_fails_job() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&site)
        .await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Failed);
    assert_eq!(summary.pages_persisted, 0);
    assert_eq!(store.count_pages(summary.job_id).unwrap(), 0);

    let job = store.get_job(summary.job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.expect("failed job should carry a message");
    assert!(!message.is_empty());
    assert!(message.contains("500"));
}

#[tokio::test]
async fn test_seed_unreachable_fails_job() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, false), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("http://127.0.0.1:{}/", port)))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Failed);
    assert!(summary.error.unwrap().contains("unreachable"));
}

#[tokio::test]
async fn test_page_cap_of_one() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"<title>Home</title><a href="/a">A</a><a href="/b">B</a>"#,
    )
    .await;
    mount_forbidden(&site, "/a").await;
    mount_forbidden(&site, "/b").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(4, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())).with_max_pages(1))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(persisted_paths(&store, summary.job_id), vec!["/"]);
}

#[tokio::test]
async fn test_missing_child_is_skipped() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"<a href="/missing">gone</a><a href="/present">here</a>"#,
    )
    .await;
    mount_page(&site, "/present", "<title>Present</title>").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&site)
        .await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(4, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.pages_skipped, 1);
    assert_eq!(persisted_paths(&store, summary.job_id), vec!["/", "/present"]);
}

#[tokio::test]
async fn test_depth_limit_respected() {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/d1">1</a>"#).await;
    mount_page(&site, "/d1", r#"<a href="/d2">2</a>"#).await;
    mount_forbidden(&site, "/d2").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(4, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())).with_max_depth(1))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(persisted_paths(&store, summary.job_id), vec!["/", "/d1"]);

    let depths: Vec<u32> = store
        .list_pages(summary.job_id, 0, 10)
        .unwrap()
        .iter()
        .map(|p| p.depth)
        .collect();
    assert!(depths.iter().all(|d| *d <= 1));
}

#[tokio::test]
async fn test_non_html_child_skipped() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"<a href="/report.pdf">PDF</a><a href="/page">Page</a>"#,
    )
    .await;
    mount_page(&site, "/page", "<title>Page</title>").await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .mount(&site)
        .await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.pages_skipped, 1);
    assert_eq!(persisted_paths(&store, summary.job_id), vec!["/", "/page"]);
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .expect(1)
        .mount(&site)
        .await;
    mount_page(
        &site,
        "/",
        r#"<a href="/private/secret">secret</a><a href="/public">public</a>"#,
    )
    .await;
    mount_page(&site, "/public", "<title>Public</title>").await;
    mount_forbidden(&site, "/private/secret").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(4, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(persisted_paths(&store, summary.job_id), vec!["/", "/public"]);
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .expect(0)
        .mount(&site)
        .await;
    mount_page(&site, "/", "<title>Home</title>").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, false), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.pages_persisted, 1);
}

#[tokio::test]
async fn test_redirect_recorded_under_requested_url() {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/old">old</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&site)
        .await;
    mount_page(&site, "/new", r#"<title>New Home</title><a href="/">home</a>"#).await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, true), store.clone());

    let summary = engine
        .crawl(CrawlRequest::new(format!("{}/", site.uri())))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    let pages = store.list_pages(summary.job_id, 0, 10).unwrap();
    let moved = pages.iter().find(|p| p.url.ends_with("/old")).unwrap();
    assert_eq!(moved.title.as_deref(), Some("New Home"));
    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn test_same_seed_runs_independent_jobs() {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<title>Home</title><a href="/a">A</a>"#).await;
    mount_page(&site, "/a", "<title>A</title>").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, true), store.clone());
    let seed = format!("{}/", site.uri());

    let first = engine.submit(CrawlRequest::new(seed.as_str())).unwrap();
    let second = engine.submit(CrawlRequest::new(seed.as_str())).unwrap();
    assert_ne!(first.job_id(), second.job_id());

    let first = first.wait().await.unwrap();
    let second = second.wait().await.unwrap();

    for summary in [&first, &second] {
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(persisted_paths(&store, summary.job_id), vec!["/", "/a"]);
    }
    assert_eq!(store.list_jobs(10, 0).unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_jobs_on_different_sites() {
    let site_a = MockServer::start().await;
    let site_b = MockServer::start().await;
    mount_page(&site_a, "/", r#"<a href="/only-a">a</a>"#).await;
    mount_page(&site_a, "/only-a", "<title>A</title>").await;
    mount_page(&site_b, "/", r#"<a href="/only-b">b</a>"#).await;
    mount_page(&site_b, "/only-b", "<title>B</title>").await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, true), store.clone());

    let job_a = engine
        .submit(CrawlRequest::new(format!("{}/", site_a.uri())))
        .unwrap();
    let job_b = engine
        .submit(CrawlRequest::new(format!("{}/", site_b.uri())))
        .unwrap();

    let (a, b) = tokio::join!(job_a.wait(), job_b.wait());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(persisted_paths(&store, a.job_id), vec!["/", "/only-a"]);
    assert_eq!(persisted_paths(&store, b.job_id), vec!["/", "/only-b"]);
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(2, true), store.clone());

    assert!(matches!(
        engine.submit(CrawlRequest::new("not a url")),
        Err(TrawlError::Url(_))
    ));
    assert!(matches!(
        engine.submit(CrawlRequest::new("ftp://example.com/")),
        Err(TrawlError::Url(_))
    ));
    assert!(matches!(
        engine.submit(CrawlRequest::new("https://example.com/").with_max_pages(0)),
        Err(TrawlError::InvalidRequest(_))
    ));

    assert!(store.list_jobs(10, 0).unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_returns_before_crawl_finishes() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<title>Slow</title>").set_delay(Duration::from_millis(300)))
        .mount(&site)
        .await;

    let (_dir, store) = create_test_store();
    let engine = create_engine(create_test_config(1, false), store.clone());

    let handle = engine
        .submit(CrawlRequest::new(format!("{}/", site.uri())))
        .unwrap();

    let status = store.get_job(handle.job_id()).unwrap().unwrap().status;
    assert!(!status.is_terminal());

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
}

/// Pages in the synthetic site served by `CountingFetcher`
const SITE_SIZE: u64 = 150;

/// Serves a synthetic site where every page /p{n} links back to /p0 and to
/// the ten pages after it, so most pages are discovered by many workers
struct CountingFetcher {
    fetches: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl CountingFetcher {
    fn new(delay: Duration) -> Self {
        Self {
            fetches: Mutex::new(HashMap::new()),
            delay,
        }
    }
}

#[async_trait]
impl Fetch for CountingFetcher {
    async fn attempt(&self, url: &Url) -> Attempt {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        tokio::time::sleep(self.delay).await;

        let n: u64 = url
            .path()
            .trim_start_matches("/p")
            .parse()
            .unwrap_or(0);
        let body: String = std::iter::once(0)
            .chain((1..=10).map(|k| (n + k) % SITE_SIZE))
            .map(|target| format!(r#"<a href="/p{}">link</a>"#, target))
            .collect();

        Attempt::Done(FetchResult::Success {
            final_url: url.clone(),
            status_code: 200,
            content_type: "text/html".to_string(),
            body: format!("<title>Page {}</title>{}", n, body).into_bytes(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_workers_never_fetch_twice() {
    let mut config = create_test_config(64, false);
    config.crawler.max_depth = 30;

    let (_dir, store) = create_test_store();
    let fetcher = Arc::new(CountingFetcher::new(Duration::from_millis(5)));
    let engine = CrawlEngine::new(Arc::new(config), store.clone(), fetcher.clone());

    let summary = engine
        .crawl(CrawlRequest::new("https://stress.test/p0").with_max_pages(100))
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);

    let fetches = fetcher.fetches.lock().unwrap();
    let repeated: Vec<_> = fetches.iter().filter(|(_, count)| **count > 1).collect();
    assert!(repeated.is_empty(), "fetched more than once: {:?}", repeated);
    assert!(fetches.len() <= 100);

    assert_eq!(summary.pages_persisted, 100);
    assert_eq!(store.count_pages(summary.job_id).unwrap(), 100);
}
