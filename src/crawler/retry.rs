//! Retry/backoff controller
//!
//! Every failure path in the orchestrator asks [`RetryController::decide`]
//! what to do next. Policies live in one table keyed by [`FailureKind`].

use crate::config::CrawlerConfig;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Classification of a failed render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The page did not load or become ready in time
    NavigationTimeout,
    /// Transport or browser-process level failure
    DriverFailure,
    /// The DOM changed under an element reference
    StaleElement,
    /// The session could not be (re-)established for this task
    AuthenticationFailure,
    /// Anything else; never retried
    UnknownRender,
}

impl FailureKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::UnknownRender)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NavigationTimeout => "navigation timeout",
            Self::DriverFailure => "driver failure",
            Self::StaleElement => "stale element",
            Self::AuthenticationFailure => "authentication failure",
            Self::UnknownRender => "unknown render error",
        };
        f.write_str(name)
    }
}

/// What to do with a failure of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry after `delay` while fewer than `max_attempts` have been made
    Retry { max_attempts: u32, delay: Duration },
    /// Drop the task on first occurrence
    Abandon,
}

/// The controller's verdict for one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Maps failure kinds to retry policies
#[derive(Debug, Clone)]
pub struct RetryController {
    policies: HashMap<FailureKind, RetryPolicy>,
}

impl RetryController {
    /// Transient kinds retry with a fixed delay; `UnknownRender` is abandoned
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        let retry = RetryPolicy::Retry {
            max_attempts,
            delay,
        };
        let policies = [
            (FailureKind::NavigationTimeout, retry),
            (FailureKind::DriverFailure, retry),
            (FailureKind::StaleElement, retry),
            (FailureKind::AuthenticationFailure, retry),
            (FailureKind::UnknownRender, RetryPolicy::Abandon),
        ]
        .into_iter()
        .collect();

        Self { policies }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay())
    }

    /// Replaces the policy for one kind
    pub fn with_policy(mut self, kind: FailureKind, policy: RetryPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn policy(&self, kind: FailureKind) -> RetryPolicy {
        self.policies
            .get(&kind)
            .copied()
            .unwrap_or(RetryPolicy::Abandon)
    }

    /// Decides whether a task that just failed its `attempt`-th try goes again
    ///
    /// # Arguments
    ///
    /// * `kind` - Classification of the failure
    /// * `attempt` - 1-based number of the attempt that failed
    pub fn decide(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        match self.policy(kind) {
            RetryPolicy::Retry {
                max_attempts,
                delay,
            } if attempt < max_attempts => RetryDecision::RetryAfter(delay),
            _ => RetryDecision::GiveUp,
        }
    }
}
