//! Crawl statistics display

use crate::crawler::{CrawlResult, FailureKind};
use std::collections::HashMap;

/// Counts recorded failures by kind, most frequent first
pub fn failures_by_kind(result: &CrawlResult) -> Vec<(FailureKind, usize)> {
    let mut counts: HashMap<FailureKind, usize> = HashMap::new();
    for failure in &result.failures {
        *counts.entry(failure.kind).or_insert(0) += 1;
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
    counts
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `result` - The finished (or aborted) crawl's counters
pub fn print_statistics(result: &CrawlResult) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages captured: {}", result.visited);
    println!("  Pages failed: {}", result.failed);
    println!("  Tasks skipped: {}", result.skipped);
    println!("  Retries: {}", result.retried);
    println!("  Re-authentications: {}", result.reauthentications);
    println!("  Elements expanded: {}", result.expanded);
    println!("  Links discovered: {}", result.discovered);
    if let Some(seconds) = result.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    if result.cancelled {
        println!("  Stopped early: yes");
    }
    println!();

    let by_kind = failures_by_kind(result);
    if !by_kind.is_empty() {
        println!("Failure Summary:");
        for (kind, count) in by_kind {
            println!("  {}: {}", kind, count);
        }
        println!();

        println!("Failed URLs ({}):", result.failures.len());
        for failure in &result.failures {
            println!(
                "  - {} ({} after {} attempt(s))",
                failure.url, failure.kind, failure.attempts
            );
        }
        println!();
    }

    if !result.sink_failures.is_empty() {
        println!("Output Failures ({}):", result.sink_failures.len());
        for failure in &result.sink_failures {
            println!("  - {}: {}", failure.url, failure.message);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} tasks captured)",
        result.success_rate(),
        result.visited,
        result.total()
    );
}
