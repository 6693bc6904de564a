//! Crawler module: rendering, expansion, extraction and orchestration
//!
//! This module contains the core crawling logic, including:
//! - Retry classification and policy
//! - Expansion of collapsed content and iframe capture
//! - Noise removal and same-origin link discovery
//! - The worker pool that ties it all together

mod coordinator;
mod expander;
mod extractor;
mod result;
mod retry;

pub use coordinator::{Orchestrator, SeedSource, Worker};
pub use expander::{capture_frames, expand_all, CapturedFrame, ExpansionReport};
pub use extractor::{
    assemble_snapshot, clean_html, discover_links, enqueue_discovered, DiscoveredLink,
    PageSnapshot,
};
pub use result::{CrawlResult, FailureRecord, SinkFailure};
pub use retry::{FailureKind, RetryController, RetryDecision, RetryPolicy};

use crate::config::Config;
use crate::driver::RenderDriver;
use crate::output::OutputSink;
use crate::CrawlError;

/// Runs a complete crawl over the configured seeds
///
/// Convenience entry point for embedding: builds an [`Orchestrator`],
/// seeds it from `config`, runs `workers` to completion and hands the sink
/// back alongside the result.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `sink` - Receives every captured page
/// * `workers` - One per driver/session pair
///
/// # Returns
///
/// * `Ok((CrawlResult, S))` - Crawl completed
/// * `Err(CrawlError)` - A worker could not log in, or the config is unusable
pub async fn crawl<D, S>(
    config: &Config,
    sink: S,
    workers: Vec<Worker<D>>,
) -> Result<(CrawlResult, S), CrawlError>
where
    D: RenderDriver,
    S: OutputSink,
{
    let orchestrator = Orchestrator::new(config, sink)?;
    orchestrator.seed(config.seed_urls());
    let result = orchestrator.run(workers).await?;
    Ok((result, orchestrator.into_sink()))
}
