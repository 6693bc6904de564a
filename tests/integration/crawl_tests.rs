//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end through the HTTP render driver.

use tempfile::TempDir;
use unfurl::config::{parse_config, Config};
use unfurl::crawler::{crawl, FailureKind, Worker};
use unfurl::output::{DirectorySink, MemorySink};
use unfurl::{Credentials, HttpDriver, SessionManager};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_FORM: &str = r#"
    <form method="post" action="/sign-in">
      <input type="email" name="email">
      <input type="password" name="password">
      <button type="submit">Sign in</button>
    </form>"#;

/// Creates a test configuration with short timings
fn create_test_config(base_url: &str, seeds: &[&str], with_session: bool) -> Config {
    let seeds: Vec<String> = seeds
        .iter()
        .map(|s| format!("\"{}{}\"", base_url, s))
        .collect();

    let session = if with_session {
        format!(
            r#"
[session]
login-url = "{}/sign-in"
post-login-patterns = ["dashboard"]
sign-in-patterns = ["sign-in"]
field-timeout-secs = 2
login-timeout-secs = 2
post-login-settle-ms = 0
"#,
            base_url
        )
    } else {
        String::new()
    };

    parse_config(&format!(
        r#"
[crawler]
workers = 1
max-attempts = 3
retry-delay-ms = 10
page-timeout-secs = 5
slow-page-patterns = []
poll-interval-ms = 10
consent-timeout-secs = 0

[origin]
seeds = [{}]

[expansion]
click-pause-ms = 0
round-settle-ms = 0
final-settle-ms = 0
{}"#,
        seeds.join(", "),
        session
    ))
    .expect("test config must be valid")
}

fn create_test_worker(config: &Config) -> Worker<HttpDriver> {
    let driver = HttpDriver::new(config.crawler.page_timeout()).expect("driver");
    let session = match &config.session {
        Some(session) => SessionManager::new(
            session,
            &config.crawler,
            Credentials::new("me@example.com", "hunter2"),
        ),
        None => SessionManager::anonymous(),
    };
    Worker::new(0, driver, session)
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, verb: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.to_string() == verb && r.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_full_crawl_single_origin() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/page1">Page 1</a>
           <a href="/page2">Page 2</a>
           <a href="https://elsewhere.example.org/x">Elsewhere</a>
           <div class="cookie-banner">We use cookies</div>"#,
    )
    .await;
    mount_page(&server, "/page1", r#"<p>Content 1</p><a href="/">Home</a>"#).await;
    mount_page(&server, "/page2", r#"<p>Content 2</p><a href="/page1">Back</a>"#).await;

    let config = create_test_config(&base, &["/"], false);
    let worker = create_test_worker(&config);

    let (result, sink) = crawl(&config, MemorySink::new(), vec![worker])
        .await
        .expect("crawl should succeed");

    assert_eq!(result.visited, 3);
    assert_eq!(result.failed, 0);
    assert_eq!(sink.len(), 3);
    assert!(sink.urls().iter().all(|u| u.starts_with(&base)));

    let pages = sink.pages();
    assert!(pages.iter().all(|(_, body)| !body.contains("We use cookies")));
    assert!(pages.iter().any(|(_, body)| body.contains("Content 2")));

    for route in ["/", "/page1", "/page2"] {
        assert_eq!(count_requests(&server, "GET", route).await, 1, "{}", route);
    }
}

#[tokio::test]
async fn test_equivalent_links_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/guide">Guide</a>
           <a href="/guide/">Guide again</a>
           <a href="/guide#install">Install</a>
           <a href="/GUIDE">Shouting</a>"#,
    )
    .await;
    mount_page(&server, "/guide", "<p>Guide</p>").await;
    mount_page(&server, "/GUIDE", "<p>Guide</p>").await;

    let config = create_test_config(&base, &["/"], false);
    let worker = create_test_worker(&config);

    let (result, _) = crawl(&config, MemorySink::new(), vec![worker]).await.unwrap();

    // path case is significant, trailing slash and fragment are not
    assert_eq!(result.visited, 3);
    assert_eq!(count_requests(&server, "GET", "/guide").await, 1);
    assert_eq!(count_requests(&server, "GET", "/guide/").await, 0);
}

#[tokio::test]
async fn test_collapsed_links_do_not_replace_the_page() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/a",
        r#"<a href="/b" aria-expanded="false">Menu</a>
           <form action="/search"><button aria-expanded="false">Filters</button></form>
           <p>PAGE A BODY</p>"#,
    )
    .await;
    mount_page(&server, "/b", "<p>PAGE B BODY</p>").await;

    let mut config = create_test_config(&base, &["/a"], false);
    config.origin.follow_links = false;
    let worker = create_test_worker(&config);

    let (result, sink) = crawl(&config, MemorySink::new(), vec![worker]).await.unwrap();

    assert_eq!(result.visited, 1);
    assert_eq!(result.expanded, 0);

    let pages = sink.pages();
    let (url, body) = &pages[0];
    assert_eq!(url, &format!("{}/a", base));
    assert!(body.contains("PAGE A BODY"));
    assert!(!body.contains("PAGE B BODY"));
    assert_eq!(count_requests(&server, "GET", "/b").await, 0);
    assert_eq!(count_requests(&server, "GET", "/search").await, 0);
}

#[tokio::test]
async fn test_login_then_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/sign-in", LOGIN_FORM).await;
    Mock::given(method("POST"))
        .and(path("/sign-in"))
        .and(body_string_contains("email=me%40example.com"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "/dashboard"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/dashboard", "<p>Welcome</p>").await;
    mount_page(&server, "/docs", r#"<p>Reference</p><a href="/docs/errors">Errors</a>"#).await;
    mount_page(&server, "/docs/errors", "<p>Error codes</p>").await;

    let config = create_test_config(&base, &["/docs"], true);
    let worker = create_test_worker(&config);

    let (result, sink) = crawl(&config, MemorySink::new(), vec![worker]).await.unwrap();

    assert_eq!(result.visited, 2);
    assert_eq!(result.reauthentications, 0);
    assert_eq!(
        sink.urls(),
        vec![format!("{}/docs", base), format!("{}/docs/errors", base)]
    );
}

#[tokio::test]
async fn test_session_expiry_triggers_one_relogin() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/sign-in", LOGIN_FORM).await;
    Mock::given(method("POST"))
        .and(path("/sign-in"))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "/dashboard"))
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, "/dashboard", "<p>Welcome</p>").await;
    mount_page(&server, "/docs", r#"<a href="/docs/limits">Limits</a>"#).await;

    // the first visit to /docs/limits finds the session gone
    Mock::given(method("GET"))
        .and(path("/docs/limits"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/sign-in"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, "/docs/limits", "<p>Rate limits</p>").await;

    let config = create_test_config(&base, &["/docs"], true);
    let worker = create_test_worker(&config);

    let (result, sink) = crawl(&config, MemorySink::new(), vec![worker]).await.unwrap();

    assert_eq!(result.reauthentications, 1);
    assert_eq!(result.retried, 0);
    assert_eq!(result.visited, 2);
    assert_eq!(count_requests(&server, "GET", "/docs/limits").await, 2);

    let pages = sink.pages();
    let limits = pages
        .iter()
        .find(|(url, _)| url.ends_with("/docs/limits"))
        .expect("limits page captured");
    assert!(limits.1.contains("Rate limits"));
}

#[tokio::test]
async fn test_login_failure_aborts_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/sign-in", "<p>Down for maintenance</p>").await;
    mount_page(&server, "/docs", "<p>Reference</p>").await;

    let config = create_test_config(&base, &["/docs"], true);
    let worker = create_test_worker(&config);

    let outcome = crawl(&config, MemorySink::new(), vec![worker]).await;

    assert!(matches!(
        outcome,
        Err(unfurl::CrawlError::AuthenticationFailure(_))
    ));
    assert_eq!(count_requests(&server, "GET", "/docs").await, 0);
}

#[tokio::test]
async fn test_server_errors_retried_then_abandoned() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(&base, &["/flaky"], false);
    let worker = create_test_worker(&config);

    let (result, sink) = crawl(&config, MemorySink::new(), vec![worker]).await.unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.retried, 2);
    assert_eq!(result.failures[0].kind, FailureKind::DriverFailure);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/gone">Gone</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&base, &["/"], false);
    let worker = create_test_worker(&config);

    let (result, _) = crawl(&config, MemorySink::new(), vec![worker]).await.unwrap();

    assert_eq!(result.visited, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.retried, 0);
    assert_eq!(result.failures[0].kind, FailureKind::UnknownRender);
}

#[tokio::test]
async fn test_directory_output_and_index() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/api/accounts">Accounts</a>"#).await;
    mount_page(&server, "/api/accounts", "<p>Accounts API</p>").await;

    let dir = TempDir::new().unwrap();
    let sink = DirectorySink::new(dir.path().join("pages")).unwrap();

    let config = create_test_config(&base, &["/"], false);
    let worker = create_test_worker(&config);

    let (result, sink) = crawl(&config, sink, vec![worker]).await.unwrap();
    assert_eq!(result.visited, 2);

    let stored = sink.stored();
    assert_eq!(stored.len(), 2);
    let accounts = stored
        .iter()
        .find(|p| p.url.ends_with("/api/accounts"))
        .expect("accounts page stored");
    assert!(accounts.location.starts_with("api/scraped_api_accounts_"));

    let written = std::fs::read_to_string(sink.root().join(&accounts.location)).unwrap();
    assert!(written.contains("Accounts API"));

    let index = std::fs::read_to_string(sink.write_index().unwrap()).unwrap();
    assert!(index.contains("Total pages: 2"));
    assert!(index.contains(&accounts.location));
}
