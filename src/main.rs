//! Unfurl main entry point
//!
//! This is the command-line interface for the Unfurl documentation crawler.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unfurl::config::{load_config_with_hash, validate, Config, DriverKind};
use unfurl::crawler::{Orchestrator, SeedSource, Worker};
use unfurl::output::{print_statistics, DirectorySink};
use unfurl::session::EnvCredentials;
use unfurl::{ChromeDriver, HttpDriver, RenderDriver, SessionManager};

/// Unfurl: an authenticated documentation crawler
///
/// Unfurl logs into a documentation portal, walks every same-origin page,
/// opens collapsed panels, and saves a cleaned HTML snapshot of each page
/// together with an index.
#[derive(Parser, Debug)]
#[command(name = "unfurl")]
#[command(version)]
#[command(about = "An authenticated documentation crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Override the number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Crawl these URLs instead of the configured seeds (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Override the output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<String>,

    /// Override the render driver
    #[arg(long, value_enum)]
    driver: Option<DriverArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DriverArg {
    /// Headless Chrome; runs the portal's scripts
    Chrome,
    /// Plain HTTP; static pages only
    Http,
}

impl From<DriverArg> for DriverKind {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Chrome => DriverKind::Chrome,
            DriverArg::Http => DriverKind::Http,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(())
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("unfurl=info,warn"),
            1 => EnvFilter::new("unfurl=debug,info"),
            2 => EnvFilter::new("unfurl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides and re-validates
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if !cli.seeds.is_empty() {
        config.origin.seeds = cli.seeds.clone();
    }
    if let Some(output) = &cli.output {
        config.output.directory = output.clone();
    }
    if let Some(driver) = cli.driver {
        config.driver.kind = driver.into();
    }
    validate(config).context("invalid command-line override")?;
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Unfurl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!("  Retry delay: {}ms", config.crawler.retry_delay_ms);
    println!("  Page timeout: {}s", config.crawler.page_timeout_secs);
    println!("  Driver: {:?}", config.driver.kind);
    println!(
        "  Slow page timeout: {}s ({})",
        config.crawler.slow_page_timeout_secs,
        config.crawler.slow_page_patterns.join(", ")
    );

    println!("\nOrigin:");
    println!("  Start URL: {}", config.start_url().unwrap_or("-"));
    println!("  Follow links: {}", config.origin.follow_links);

    match &config.session {
        Some(session) => {
            println!("\nSession:");
            println!("  Login URL: {}", session.login_url);
            println!("  Post-login patterns: {}", session.post_login_patterns.join(", "));
            println!("  Sign-in patterns: {}", session.sign_in_patterns.join(", "));
            println!(
                "  Credentials from: ${} / ${}",
                session.identity_env, session.secret_env
            );
        }
        None => println!("\nSession: anonymous"),
    }

    println!("\nExpansion:");
    println!("  Max rounds: {}", config.expansion.max_rounds);
    println!("  Selectors ({}):", config.expansion.selectors.len());
    for selector in &config.expansion.selectors {
        println!("    * {}", selector);
    }

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Write index: {}", config.output.write_index);

    println!("\nSeeds ({}):", config.origin.seeds.len());
    for seed in &config.origin.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        config.origin.seeds.len()
    );
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let sink = DirectorySink::new(&config.output.directory)
        .with_context(|| format!("cannot create output directory {}", config.output.directory))?;

    let provider = config
        .session
        .as_ref()
        .map(EnvCredentials::from_config)
        .unwrap_or_else(|| EnvCredentials::new("UNFURL_IDENTITY", "UNFURL_SECRET"));

    let mut sessions = Vec::with_capacity(config.crawler.workers);
    for _ in 0..config.crawler.workers {
        sessions.push(SessionManager::from_config(&config, &provider)?);
    }

    match config.driver.kind {
        DriverKind::Chrome => {
            let drivers = launch_browsers(&config).await?;
            run_crawl(&config, sink, into_workers(drivers, sessions)).await
        }
        DriverKind::Http => {
            let mut drivers = Vec::with_capacity(config.crawler.workers);
            for _ in 0..config.crawler.workers {
                drivers.push(
                    HttpDriver::new(config.crawler.page_timeout())
                        .context("failed to build render driver")?,
                );
            }
            run_crawl(&config, sink, into_workers(drivers, sessions)).await
        }
    }
}

/// Starts one browser per worker, closing the ones already up if any fails
async fn launch_browsers(config: &Config) -> anyhow::Result<Vec<ChromeDriver>> {
    let request_timeout = config
        .crawler
        .slow_page_timeout()
        .max(config.crawler.page_timeout());

    let mut drivers = Vec::with_capacity(config.crawler.workers);
    for id in 0..config.crawler.workers {
        match ChromeDriver::launch(&config.driver, id, request_timeout).await {
            Ok(driver) => drivers.push(driver),
            Err(e) => {
                for mut driver in drivers {
                    if let Err(quit) = driver.quit().await {
                        tracing::warn!("Failed to close browser: {}", quit);
                    }
                }
                return Err(e).context(
                    "failed to launch browser (set [driver] kind = \"http\" to crawl without one)",
                );
            }
        }
    }
    Ok(drivers)
}

fn into_workers<D: RenderDriver>(
    drivers: Vec<D>,
    sessions: Vec<SessionManager>,
) -> Vec<Worker<D>> {
    drivers
        .into_iter()
        .zip(sessions)
        .enumerate()
        .map(|(id, (driver, session))| Worker::new(id, driver, session))
        .collect()
}

/// Runs the crawl, writes the index and prints statistics
async fn run_crawl<D: RenderDriver>(
    config: &Config,
    sink: DirectorySink,
    workers: Vec<Worker<D>>,
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(config, sink)?;
    let queued = orchestrator.seed(config.seed_urls());
    tracing::info!("Total seed URLs: {}", queued);

    let token = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            token.cancel();
        }
    });

    let outcome = orchestrator.run(workers).await;

    if config.output.write_index {
        orchestrator
            .sink()
            .write_index()
            .context("failed to write index")?;
    }

    match outcome {
        Ok(result) => {
            print_statistics(&result);
            if result.visited == 0 && result.failed > 0 {
                bail!("no page could be captured");
            }
            tracing::info!("Crawl completed");
            Ok(())
        }
        Err(e) => {
            print_statistics(&orchestrator.result());
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
