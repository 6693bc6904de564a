//! Crawl orchestration
//!
//! The [`Orchestrator`] owns the shared crawl state and runs a fixed pool of
//! [`Worker`]s over it. Each worker pairs one render driver with one session,
//! so workers never share a browser or a login. The frontier, visited set and
//! result counters sit behind short-lived mutexes that are never held across
//! an `.await`.
//!
//! Per task a worker:
//! 1. Makes sure its session is authenticated
//! 2. Navigates and waits for the document to be ready
//! 3. Detects a bounce to the sign-in page and re-authenticates once
//! 4. Dismisses any consent prompt, expands collapsed content, captures iframes
//! 5. Cleans the HTML, discovers same-origin links and queues the new ones
//! 6. Hands the snapshot to the output sink
//!
//! Failures go through the [`RetryController`]; permanent ones are recorded
//! in the [`CrawlResult`] and never stop the crawl. The only failure that
//! ends the whole run is a worker that cannot log in at all.

use crate::config::Config;
use crate::crawler::expander::{capture_frames, expand_all, CapturedFrame, ExpansionReport};
use crate::crawler::extractor::{
    assemble_snapshot, clean_html, discover_links, enqueue_discovered, DiscoveredLink,
    PageSnapshot,
};
use crate::crawler::result::{CrawlResult, FailureRecord, SinkFailure};
use crate::crawler::retry::{RetryController, RetryDecision};
use crate::driver::{dismiss_consent, wait_for, Condition, RenderDriver, WaitOutcome};
use crate::output::OutputSink;
use crate::session::SessionManager;
use crate::state::{CrawlTask, CrawlerState};
use crate::url::{normalize_url, resolve_link, Origin, UrlPattern};
use crate::{ConfigError, CrawlError, UrlError};
use chrono::Utc;
use futures::future::join_all;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upper bound on how long an idle worker sleeps before rechecking the frontier
const IDLE_RECHECK: Duration = Duration::from_millis(250);

/// Whether two URLs name the same document once normalized
fn same_document(a: &str, b: &str) -> bool {
    match (normalize_url(a), normalize_url(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Supplies the URLs that prime the frontier
pub trait SeedSource {
    fn seed_urls(&self) -> Vec<String>;
}

impl SeedSource for Config {
    fn seed_urls(&self) -> Vec<String> {
        self.origin.seeds.clone()
    }
}

/// One render driver and the session that logs it in
pub struct Worker<D: RenderDriver> {
    id: usize,
    driver: D,
    session: SessionManager,
}

impl<D: RenderDriver> Worker<D> {
    pub fn new(id: usize, driver: D, session: SessionManager) -> Self {
        Self {
            id,
            driver,
            session,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

/// What rendering one task produced
enum PageOutcome {
    Captured {
        url: String,
        html: String,
        links: Vec<DiscoveredLink>,
        expanded: usize,
    },
    SignInRedirect {
        landed: String,
    },
}

/// Runs a crawl over a pool of workers
pub struct Orchestrator<S: OutputSink> {
    config: Config,
    origin: Origin,
    state: Mutex<CrawlerState>,
    result: Mutex<CrawlResult>,
    retry: RetryController,
    sink: S,
    cancel: CancellationToken,
    work_available: Notify,
    slow_pages: UrlPattern,
    expansion_scope: UrlPattern,
}

impl<S: OutputSink> Orchestrator<S> {
    /// Creates an orchestrator with an empty frontier
    ///
    /// # Arguments
    ///
    /// * `config` - Validated crawl configuration
    /// * `sink` - Receives every captured page
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to be seeded and run
    /// * `Err(CrawlError)` - The configuration names no usable start URL
    pub fn new(config: &Config, sink: S) -> Result<Self, CrawlError> {
        let start_url = config.start_url().ok_or_else(|| {
            ConfigError::Validation("origin needs a start URL or at least one seed".to_string())
        })?;
        let origin = Origin::from_start_url(start_url, config.origin.include_port)?;
        tracing::debug!("Crawl origin is {}", origin.host());

        Ok(Self {
            config: config.clone(),
            origin,
            state: Mutex::new(CrawlerState::new()),
            result: Mutex::new(CrawlResult::default()),
            retry: RetryController::from_config(&config.crawler),
            sink,
            cancel: CancellationToken::new(),
            work_available: Notify::new(),
            slow_pages: UrlPattern::new(&config.crawler.slow_page_patterns),
            expansion_scope: UrlPattern::new(&config.expansion.url_patterns),
        })
    }

    /// Queues seed URLs
    ///
    /// Seeds are not subject to the origin filter. A seed that duplicates an
    /// earlier one is counted as skipped; one that does not parse is
    /// recorded as a failure.
    ///
    /// # Returns
    ///
    /// The number of seeds actually queued
    pub fn seed<I, U>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = U>,
        U: AsRef<str>,
    {
        let mut queued = 0;
        for url in urls {
            let url = url.as_ref();
            match CrawlTask::seed(url) {
                Ok(task) => {
                    if self.state().push(task) {
                        queued += 1;
                    } else {
                        tracing::debug!("Skipping duplicate seed {}", url);
                        self.result_mut().skipped += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Invalid seed {}: {}", url, e);
                    let err = CrawlError::from(e);
                    self.result_mut().record_failure(FailureRecord {
                        url: url.to_string(),
                        kind: err.kind(),
                        attempts: 0,
                        message: err.to_string(),
                    });
                }
            }
        }
        self.work_available.notify_waiters();
        queued
    }

    /// Token that stops the crawl when cancelled
    ///
    /// In-flight tasks run to completion; nothing new is started and
    /// everything still queued is counted as skipped.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the counters so far
    pub fn result(&self) -> CrawlResult {
        self.result_mut().clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs every worker until the frontier is exhausted or the crawl is cancelled
    ///
    /// Every worker's driver is shut down before this returns, whatever the
    /// outcome.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - The crawl finished or was cancelled
    /// * `Err(CrawlError::AuthenticationFailure)` - A worker could not
    ///   establish a session; the rest of the pool was stopped
    pub async fn run<D: RenderDriver>(
        &self,
        workers: Vec<Worker<D>>,
    ) -> Result<CrawlResult, CrawlError> {
        if workers.is_empty() {
            return Err(ConfigError::Validation("at least one worker is required".to_string()).into());
        }

        self.result_mut().started_at = Some(Utc::now());
        tracing::info!(
            "Starting crawl of {} with {} worker(s), {} task(s) queued",
            self.origin.host(),
            workers.len(),
            self.state().pending()
        );

        let outcomes = join_all(workers.into_iter().map(|w| self.run_worker(w))).await;

        let unprocessed = self.state().drain_pending();
        if !unprocessed.is_empty() {
            tracing::warn!("{} task(s) left unprocessed", unprocessed.len());
        }

        let result = {
            let mut result = self.result_mut();
            result.skipped += unprocessed.len();
            result.cancelled = self.cancel.is_cancelled();
            result.finished_at = Some(Utc::now());
            result.clone()
        };

        tracing::info!(
            "Crawl finished: {} visited, {} failed, {} skipped",
            result.visited,
            result.failed,
            result.skipped
        );

        match outcomes.into_iter().find_map(Result::err) {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    async fn run_worker<D: RenderDriver>(&self, mut worker: Worker<D>) -> Result<(), CrawlError> {
        tracing::debug!("Worker {} started", worker.id);
        let outcome = self.worker_loop(&mut worker).await;

        if let Err(e) = worker.driver.quit().await {
            tracing::warn!("Worker {} driver did not shut down cleanly: {}", worker.id, e);
        }
        tracing::debug!("Worker {} stopped", worker.id);
        outcome
    }

    async fn worker_loop<D: RenderDriver>(&self, worker: &mut Worker<D>) -> Result<(), CrawlError> {
        while let Some(task) = self.next_task().await {
            if let Err(e) = worker.session.ensure_authenticated(&mut worker.driver).await {
                if worker.session.last_verified_at().is_none() {
                    tracing::error!(
                        "Worker {} could not establish a session, stopping crawl",
                        worker.id
                    );
                    self.state().requeue(task, true);
                    self.cancel.cancel();
                    self.work_available.notify_waiters();
                    return Err(e);
                }
                self.handle_failure(task, e).await;
                continue;
            }

            match self.render(worker, &task).await {
                Ok(PageOutcome::Captured {
                    url,
                    html,
                    links,
                    expanded,
                }) => self.complete(task, url, html, links, expanded),
                Ok(PageOutcome::SignInRedirect { landed }) => {
                    self.handle_sign_in_redirect(worker, task, &landed).await
                }
                Err(e) => self.handle_failure(task, e).await,
            }
        }
        Ok(())
    }

    /// Claims the next task, waiting while other workers may still produce some
    async fn next_task(&self) -> Option<CrawlTask> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let notified = self.work_available.notified();
            {
                let mut state = self.state();
                if let Some(task) = state.pop_next() {
                    return Some(task);
                }
                if state.is_exhausted() {
                    drop(state);
                    self.work_available.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(IDLE_RECHECK) => {}
            }
        }
    }

    /// Loads, expands and captures one page
    async fn render<D: RenderDriver>(
        &self,
        worker: &mut Worker<D>,
        task: &CrawlTask,
    ) -> Result<PageOutcome, CrawlError> {
        let crawler = &self.config.crawler;
        let driver = &mut worker.driver;

        tracing::debug!("Worker {} rendering {} (attempt {})", worker.id, task.url, task.attempt);
        driver.navigate(&task.url).await?;

        let slow = self.slow_pages.matches(&task.url);
        let timeout = if slow {
            crawler.slow_page_timeout()
        } else {
            crawler.page_timeout()
        };
        let ready = wait_for(driver, &Condition::DocumentReady, timeout, crawler.poll_interval()).await?;
        if ready == WaitOutcome::TimedOut {
            return Err(CrawlError::NavigationTimeout(format!(
                "{} not ready within {:?}",
                task.url, timeout
            )));
        }

        let landed = driver.current_url().await?;
        if worker.session.is_sign_in_redirect(&task.url, &landed) {
            return Ok(PageOutcome::SignInRedirect { landed });
        }

        if slow {
            tokio::time::sleep(crawler.slow_page_settle()).await;
        }

        dismiss_consent(
            driver,
            &crawler.consent_selector,
            Duration::ZERO,
            crawler.poll_interval(),
        )
        .await;

        let mut report = if self.expansion_scope.matches_or_empty(&task.url) {
            expand_all(driver, &self.config.expansion).await?
        } else {
            ExpansionReport::default()
        };

        // a toggle that was really a link took the browser elsewhere
        let now_on = driver.current_url().await?;
        if !same_document(&landed, &now_on) {
            tracing::warn!(
                "Worker {}: expanding {} navigated to {}, capturing it unexpanded",
                worker.id,
                landed,
                now_on
            );
            driver.navigate(&landed).await?;
            let ready =
                wait_for(driver, &Condition::DocumentReady, timeout, crawler.poll_interval()).await?;
            if ready == WaitOutcome::TimedOut {
                return Err(CrawlError::NavigationTimeout(format!(
                    "{} not ready within {:?} after reload",
                    landed, timeout
                )));
            }
            report = ExpansionReport::default();
        }

        let frames = capture_frames(
            driver,
            self.config.expansion.frame_timeout(),
            crawler.poll_interval(),
        )
        .await?;
        let main = driver.outer_html().await?;

        let noise = &self.config.cleaning.noise_selectors;
        let main = clean_html(&main, noise);
        let frames: Vec<CapturedFrame> = frames
            .into_iter()
            .map(|f| CapturedFrame {
                html: clean_html(&f.html, noise),
                ..f
            })
            .collect();

        let links = if self.config.origin.follow_links {
            let page_url = Url::parse(&landed).map_err(|e| UrlError::Parse(e.to_string()))?;
            let mut links = discover_links(&main, &page_url, &self.origin);
            for frame in &frames {
                let frame_url = frame
                    .src
                    .as_deref()
                    .and_then(|src| resolve_link(src, &page_url))
                    .unwrap_or_else(|| page_url.clone());
                links.extend(discover_links(&frame.html, &frame_url, &self.origin));
            }
            links
        } else {
            Vec::new()
        };

        let frames: Vec<String> = frames.into_iter().map(|f| f.html).collect();
        Ok(PageOutcome::Captured {
            url: task.url.clone(),
            html: assemble_snapshot(main, &frames),
            links,
            expanded: report.total(),
        })
    }

    /// Marks a page visited, queues its links and stores the snapshot
    fn complete(
        &self,
        task: CrawlTask,
        url: String,
        html: String,
        links: Vec<DiscoveredLink>,
        expanded: usize,
    ) {
        let queued = {
            let mut state = self.state();
            state.mark_visited(&task.key);
            enqueue_discovered(&mut state, &task.key, links)
        };
        self.work_available.notify_waiters();

        let snapshot = PageSnapshot {
            url,
            key: task.key,
            html,
            discovered_links: queued,
            expanded_count: expanded,
        };
        tracing::info!(
            "Captured {} ({} expanded, {} new link(s))",
            snapshot.url,
            snapshot.expanded_count,
            snapshot.discovered_links.len()
        );

        let stored = self.sink.store(&snapshot.url, &snapshot.html);
        let pending = self.state().pending();

        let mut result = self.result_mut();
        result.visited += 1;
        result.expanded += snapshot.expanded_count;
        result.discovered += snapshot.discovered_links.len();
        match stored {
            Ok(location) => tracing::debug!("Stored {} at {}", snapshot.url, location),
            Err(e) => {
                tracing::error!("Failed to store {}: {}", snapshot.url, e);
                result.sink_failures.push(SinkFailure {
                    url: snapshot.url.clone(),
                    message: e.to_string(),
                });
            }
        }

        if result.visited % 10 == 0 {
            tracing::info!(
                "Progress: {} pages captured, {} queued",
                result.visited,
                pending
            );
        }
    }

    /// The page bounced to sign-in: re-login once, then treat it as a failure
    async fn handle_sign_in_redirect<D: RenderDriver>(
        &self,
        worker: &mut Worker<D>,
        task: CrawlTask,
        landed: &str,
    ) {
        if task.reauth_used {
            let err = CrawlError::AuthenticationFailure(format!(
                "{} still redirects to {} after re-authenticating",
                task.url, landed
            ));
            self.handle_failure(task, err).await;
            return;
        }

        tracing::warn!(
            "{} redirected to {}, re-authenticating worker {}",
            task.url,
            landed,
            worker.id
        );
        worker.session.mark_expired();
        self.result_mut().reauthentications += 1;
        self.state().requeue(task.after_reauth(), true);
        self.work_available.notify_waiters();
    }

    /// Retries a failed task or records it as permanently failed
    async fn handle_failure(&self, task: CrawlTask, err: CrawlError) {
        let kind = err.kind();
        match self.retry.decide(kind, task.attempt) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    "{} failed on attempt {} ({}): {}; retrying in {:?}",
                    task.url,
                    task.attempt,
                    kind,
                    err,
                    delay
                );
                self.result_mut().retried += 1;

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => {}
                }

                self.state().requeue(task.next_attempt(), false);
            }
            RetryDecision::GiveUp => {
                tracing::error!(
                    "Giving up on {} after {} attempt(s) ({}): {}",
                    task.url,
                    task.attempt,
                    kind,
                    err
                );
                self.state().mark_visited(&task.key);
                self.result_mut().record_failure(FailureRecord {
                    url: task.url,
                    kind,
                    attempts: task.attempt,
                    message: err.to_string(),
                });
            }
        }
        self.work_available.notify_waiters();
    }

    fn state(&self) -> MutexGuard<'_, CrawlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn result_mut(&self) -> MutexGuard<'_, CrawlResult> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, SessionConfig};
    use crate::crawler::retry::FailureKind;
    use crate::driver::fake::{FakeDriver, FakeElement, FakeFailure, FakePage};
    use crate::output::{MemorySink, OutputError, OutputResult};
    use crate::session::Credentials;

    const ROOT: &str = "https://docs.example.com/";
    const PAGE_A: &str = "https://docs.example.com/a";
    const PAGE_B: &str = "https://docs.example.com/b";
    const LOGIN_URL: &str = "https://docs.example.com/sign-in";
    const DASHBOARD_URL: &str = "https://docs.example.com/dashboard";

    fn create_test_config(seeds: &[&str]) -> Config {
        let seeds: Vec<String> = seeds.iter().map(|s| format!("\"{}\"", s)).collect();
        parse_config(&format!(
            r#"
[crawler]
retry-delay-ms = 500
slow-page-patterns = []

[origin]
seeds = [{}]

[expansion]
click-pause-ms = 0
round-settle-ms = 0
final-settle-ms = 0
"#,
            seeds.join(", ")
        ))
        .unwrap()
    }

    fn with_session(mut config: Config) -> Config {
        config.session = Some(SessionConfig {
            login_url: LOGIN_URL.to_string(),
            post_login_settle_ms: 0,
            ..SessionConfig::default()
        });
        config
    }

    fn create_test_session(config: &Config) -> SessionManager {
        match &config.session {
            Some(session) => SessionManager::new(
                session,
                &config.crawler,
                Credentials::new("me@example.com", "hunter2"),
            ),
            None => SessionManager::anonymous(),
        }
    }

    fn site() -> FakeDriver {
        FakeDriver::new()
            .with_page(
                ROOT,
                FakePage::new(
                    r#"<html><body>
                    <div class="cookie-banner">We use cookies</div>
                    <a href="/a">A</a>
                    <a href="/b">B</a>
                    <a href="https://elsewhere.example.org/x">Elsewhere</a>
                    </body></html>"#,
                )
                .element(FakeElement::new("[aria-expanded='false']").collapsed()),
            )
            .with_page(
                PAGE_A,
                FakePage::new(r#"<html><body><a href="/">Home</a><a href="/a/">Self</a></body></html>"#),
            )
            .with_page(
                PAGE_B,
                FakePage::new(r#"<html><body><a href="/a#top">A again</a></body></html>"#),
            )
            .with_page(
                LOGIN_URL,
                FakePage::new("<form></form>")
                    .element(FakeElement::new("input[type='email']"))
                    .element(FakeElement::new("input[type='password']"))
                    .element(FakeElement::new("button[type='submit']").navigates_to(DASHBOARD_URL)),
            )
            .with_page(DASHBOARD_URL, FakePage::new("<p>home</p>"))
    }

    async fn run_single(
        config: &Config,
        driver: FakeDriver,
    ) -> (Result<CrawlResult, CrawlError>, Orchestrator<MemorySink>) {
        let orchestrator = Orchestrator::new(config, MemorySink::new()).unwrap();
        orchestrator.seed(config.seed_urls());
        let worker = Worker::new(0, driver, create_test_session(config));
        let outcome = orchestrator.run(vec![worker]).await;
        (outcome, orchestrator)
    }

    struct FailingSink;

    impl OutputSink for FailingSink {
        fn store(&self, _url: &str, _html: &str) -> OutputResult<String> {
            Err(OutputError::Write("disk full".to_string()))
        }
    }

    /// Cancels the crawl as soon as the first page is stored
    struct CancellingSink {
        inner: MemorySink,
        token: CancellationToken,
    }

    impl OutputSink for CancellingSink {
        fn store(&self, url: &str, html: &str) -> OutputResult<String> {
            self.token.cancel();
            self.inner.store(url, html)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawls_same_origin_graph_once() {
        let config = create_test_config(&[ROOT]);
        let driver = site();
        let log = driver.log();

        let (outcome, orchestrator) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(result.visited, 3);
        assert_eq!(result.failed, 0);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.expanded, 1);
        assert!(result.finished_at.is_some());

        let sink = orchestrator.into_sink();
        assert_eq!(sink.urls(), vec![ROOT, PAGE_A, PAGE_B]);

        let log = log.lock().unwrap();
        for url in [ROOT, PAGE_A, PAGE_B] {
            assert_eq!(log.navigations_to(url), 1, "{} rendered more than once", url);
        }
        assert!(!log.navigations.iter().any(|u| u.contains("elsewhere")));
        assert_eq!(log.quit_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_cleaned() {
        let config = create_test_config(&[ROOT]);
        let (outcome, orchestrator) = run_single(&config, site()).await;
        outcome.unwrap();

        let pages = orchestrator.into_sink().pages();
        let (_, root_html) = &pages[0];
        assert!(!root_html.contains("We use cookies"));
        assert!(root_html.contains("href=\"/a\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equivalent_seeds_visit_once() {
        let mut config = create_test_config(&[PAGE_A, "https://docs.example.com/a/"]);
        config.origin.follow_links = false;

        let (outcome, orchestrator) = run_single(&config, site()).await;
        let result = outcome.unwrap();

        assert_eq!(result.visited, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(orchestrator.into_sink().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_links_disabled() {
        let mut config = create_test_config(&[ROOT]);
        config.origin.follow_links = false;

        let (outcome, orchestrator) = run_single(&config, site()).await;
        let result = outcome.unwrap();

        assert_eq!(result.visited, 1);
        assert_eq!(result.discovered, 0);
        assert_eq!(orchestrator.into_sink().urls(), vec![ROOT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_that_navigates_is_captured_unexpanded() {
        let mut config = create_test_config(&[PAGE_A]);
        config.origin.follow_links = false;
        let driver = FakeDriver::new()
            .with_page(
                PAGE_A,
                FakePage::new("<html><body><p>PAGE A BODY</p></body></html>").element(
                    FakeElement::new("[aria-expanded='false']")
                        .collapsed()
                        .navigates_to(PAGE_B),
                ),
            )
            .with_page(PAGE_B, FakePage::new("<html><body><p>PAGE B BODY</p></body></html>"));
        let log = driver.log();

        let (outcome, orchestrator) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(result.visited, 1);
        assert_eq!(result.expanded, 0);
        assert_eq!(log.lock().unwrap().navigations_to(PAGE_A), 2);

        let pages = orchestrator.into_sink().pages();
        let (url, html) = &pages[0];
        assert_eq!(url, PAGE_A);
        assert!(html.contains("PAGE A BODY"));
        assert!(!html.contains("PAGE B BODY"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_links_inside_iframes_are_followed() {
        let embedded = "https://docs.example.com/embed/b";
        let config = create_test_config(&[ROOT]);
        let driver = FakeDriver::new()
            .with_page(
                ROOT,
                FakePage::new("<html><body><p>root</p></body></html>").element(
                    FakeElement::new("iframe")
                        .attr("src", "/embed/widget")
                        .frame(r#"<html><body><a href="b">B</a></body></html>"#),
                ),
            )
            .with_page(embedded, FakePage::new("<html><body>embedded</body></html>"));

        let (outcome, orchestrator) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        // relative frame links resolve against the frame's own URL
        assert_eq!(result.visited, 2);
        assert_eq!(orchestrator.into_sink().urls(), vec![ROOT, embedded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_to_bound() {
        let config = create_test_config(&[PAGE_A]);
        let driver = site().fail_navigation(PAGE_A, FakeFailure::Timeout, 10);
        let log = driver.log();

        let (outcome, orchestrator) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(log.lock().unwrap().navigations_to(PAGE_A), 3);
        assert_eq!(result.retried, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.visited, 0);
        assert_eq!(result.failures[0].kind, FailureKind::NavigationTimeout);
        assert_eq!(result.failures[0].attempts, 3);
        assert!(orchestrator.into_sink().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let mut config = create_test_config(&[PAGE_A]);
        config.origin.follow_links = false;
        let driver = site().fail_navigation(PAGE_A, FakeFailure::Status(503), 1);
        let log = driver.log();

        let (outcome, _) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(log.lock().unwrap().navigations_to(PAGE_A), 2);
        assert_eq!(result.retried, 1);
        assert_eq!(result.visited, 1);
        assert_eq!(result.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let missing = "https://docs.example.com/missing";
        let config = create_test_config(&[missing]);
        let driver = site();
        let log = driver.log();

        let (outcome, _) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(log.lock().unwrap().navigations_to(missing), 1);
        assert_eq!(result.retried, 0);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].kind, FailureKind::UnknownRender);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiry_reauthenticates_once() {
        let config = with_session(create_test_config(&[ROOT]));
        let driver = site().redirect_once(PAGE_B, LOGIN_URL);
        let log = driver.log();

        let (outcome, orchestrator) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(result.reauthentications, 1);
        assert_eq!(result.retried, 0);
        assert_eq!(result.visited, 3);

        let log = log.lock().unwrap();
        assert_eq!(log.navigations_to(LOGIN_URL), 2);
        assert_eq!(log.navigations_to(PAGE_B), 2);
        assert!(orchestrator.into_sink().urls().contains(&PAGE_B.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_sign_in_redirect_terminates() {
        let config = with_session(create_test_config(&[PAGE_B]));
        let driver = site().redirect_times(PAGE_B, LOGIN_URL, 100);
        let log = driver.log();

        let (outcome, _) = run_single(&config, driver).await;
        let result = outcome.unwrap();

        assert_eq!(result.reauthentications, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].kind, FailureKind::AuthenticationFailure);

        let log = log.lock().unwrap();
        assert_eq!(log.navigations_to(LOGIN_URL), 2);
        // first try, the forced retry, then the remaining normal attempts
        assert_eq!(log.navigations_to(PAGE_B), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_failure_aborts_run() {
        let config = with_session(create_test_config(&[ROOT]));
        let driver = FakeDriver::new()
            .with_page(LOGIN_URL, FakePage::new("<p>maintenance</p>"))
            .with_page(ROOT, FakePage::new("<p>root</p>"));
        let log = driver.log();

        let (outcome, orchestrator) = run_single(&config, driver).await;

        assert!(matches!(outcome, Err(CrawlError::AuthenticationFailure(_))));
        let result = orchestrator.result();
        assert_eq!(result.visited, 0);
        assert_eq!(result.skipped, 1);

        let log = log.lock().unwrap();
        assert_eq!(log.navigations_to(ROOT), 0);
        assert_eq!(log.quit_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_keeps_page_visited() {
        let mut config = create_test_config(&[PAGE_A]);
        config.origin.follow_links = false;
        let driver = site();
        let log = driver.log();

        let orchestrator = Orchestrator::new(&config, FailingSink).unwrap();
        orchestrator.seed(&config.origin.seeds);
        let result = orchestrator
            .run(vec![Worker::new(0, driver, SessionManager::anonymous())])
            .await
            .unwrap();

        assert_eq!(result.visited, 1);
        assert_eq!(result.sink_failures.len(), 1);
        assert!(result.sink_failures[0].message.contains("disk full"));
        assert_eq!(log.lock().unwrap().navigations_to(PAGE_A), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_run_skips_everything() {
        let config = create_test_config(&[ROOT, PAGE_A]);
        let driver = site();
        let log = driver.log();

        let orchestrator = Orchestrator::new(&config, MemorySink::new()).unwrap();
        assert_eq!(orchestrator.seed(&config.origin.seeds), 2);
        orchestrator.cancel_token().cancel();

        let result = orchestrator
            .run(vec![Worker::new(0, driver, SessionManager::anonymous())])
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.visited, 0);
        assert_eq!(result.skipped, 2);

        let log = log.lock().unwrap();
        assert!(log.navigations.is_empty());
        assert_eq!(log.quit_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_crawl_finishes_in_flight_page() {
        let config = create_test_config(&[ROOT]);
        let token = CancellationToken::new();
        let sink = CancellingSink {
            inner: MemorySink::new(),
            token: token.clone(),
        };

        let mut orchestrator = Orchestrator::new(&config, sink).unwrap();
        orchestrator.cancel = token;
        orchestrator.seed(&config.origin.seeds);

        let result = orchestrator
            .run(vec![Worker::new(0, site(), SessionManager::anonymous())])
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.visited, 1);
        // /a and /b were queued by the root page but never started
        assert_eq!(result.skipped, 2);
        assert_eq!(orchestrator.into_sink().inner.urls(), vec![ROOT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_pool_renders_each_page_once() {
        let config = create_test_config(&[ROOT]);
        let first = site();
        let second = site();
        let logs = [first.log(), second.log()];

        let orchestrator = Orchestrator::new(&config, MemorySink::new()).unwrap();
        orchestrator.seed(&config.origin.seeds);
        let result = orchestrator
            .run(vec![
                Worker::new(0, first, SessionManager::anonymous()),
                Worker::new(1, second, SessionManager::anonymous()),
            ])
            .await
            .unwrap();

        assert_eq!(result.visited, 3);
        assert_eq!(orchestrator.sink().len(), 3);

        for url in [ROOT, PAGE_A, PAGE_B] {
            let total: usize = logs
                .iter()
                .map(|log| log.lock().unwrap().navigations_to(url))
                .sum();
            assert_eq!(total, 1, "{} rendered {} times", url, total);
        }
        for log in &logs {
            assert_eq!(log.lock().unwrap().quit_calls, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_requires_workers() {
        let config = create_test_config(&[ROOT]);
        let orchestrator = Orchestrator::new(&config, MemorySink::new()).unwrap();
        let workers: Vec<Worker<FakeDriver>> = Vec::new();
        assert!(matches!(
            orchestrator.run(workers).await,
            Err(CrawlError::Config(_))
        ));
    }
}
