//! Aggregate outcome of a crawl run

use crate::crawler::retry::FailureKind;
use chrono::{DateTime, Utc};

/// A task that was given up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub url: String,
    pub kind: FailureKind,

    /// Attempts made before giving up
    pub attempts: u32,

    pub message: String,
}

/// A page that rendered but could not be handed to the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    pub url: String,
    pub message: String,
}

/// Counters and failure records for one run
///
/// Every task the run accepted ends up in exactly one of `visited`,
/// `failed` or `skipped`.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    /// Pages rendered and captured
    pub visited: usize,

    /// Tasks abandoned after a permanent failure or exhausted retries
    pub failed: usize,

    /// Duplicate seeds and tasks left unprocessed at cancellation
    pub skipped: usize,

    /// Transient failures that were scheduled for another attempt
    pub retried: usize,

    /// Forced re-logins after a sign-in redirect
    pub reauthentications: usize,

    /// Elements opened across all pages
    pub expanded: usize,

    /// Links first discovered during the run
    pub discovered: usize,

    /// Whether the run stopped on cancellation
    pub cancelled: bool,

    pub failures: Vec<FailureRecord>,
    pub sink_failures: Vec<SinkFailure>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlResult {
    /// Tasks that reached a terminal outcome
    pub fn total(&self) -> usize {
        self.visited + self.failed + self.skipped
    }

    /// Percentage of terminal tasks that were captured
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.visited as f64 / total as f64) * 100.0
        }
    }

    /// Wall-clock duration in whole seconds, once the run has finished
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }

    pub(crate) fn record_failure(&mut self, record: FailureRecord) {
        self.failed += 1;
        self.failures.push(record);
    }
}
