//! Bounded waits on page predicates
//!
//! Every suspension point in the crawler goes through [`wait_for`]: a
//! predicate is polled at a fixed interval until it holds or the timeout
//! elapses. Time comes from `tokio::time`, so tests can run the waits on a
//! paused clock.

use super::{scripts, DriverError, RenderDriver};
use crate::url::UrlPattern;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// A predicate over the driver's current context
#[derive(Debug, Clone, Copy)]
pub enum Condition<'a> {
    /// `document.readyState` is `"complete"`
    DocumentReady,

    /// At least one element matches the selector
    ElementPresent(&'a str),

    /// The top-level URL matches the pattern
    UrlMatches(&'a UrlPattern),
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_satisfied(self) -> bool {
        self == Self::Satisfied
    }
}

/// Polls a condition until it holds or the timeout elapses
///
/// The condition is always checked at least once. Stale or missing
/// elements and script errors while checking mean "not yet"; any other
/// driver error ends the wait with that error.
///
/// # Arguments
///
/// * `driver` - The driver to query
/// * `condition` - The predicate to wait for
/// * `timeout` - Upper bound on the wait
/// * `poll_interval` - Delay between checks
///
/// # Returns
///
/// * `Ok(WaitOutcome::Satisfied)` - The condition held within the timeout
/// * `Ok(WaitOutcome::TimedOut)` - The timeout elapsed first
/// * `Err(DriverError)` - The driver failed while checking
pub async fn wait_for(
    driver: &mut (dyn RenderDriver + '_),
    condition: &Condition<'_>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<WaitOutcome, DriverError> {
    let deadline = Instant::now() + timeout;

    loop {
        match check(driver, condition).await {
            Ok(true) => return Ok(WaitOutcome::Satisfied),
            Ok(false) => {}
            Err(DriverError::StaleElement)
            | Err(DriverError::NoSuchElement(_))
            | Err(DriverError::Script(_)) => {}
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!("Wait for {:?} timed out after {:?}", condition, timeout);
            return Ok(WaitOutcome::TimedOut);
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Clicks a consent or cookie prompt's accept button if one shows up
///
/// Best-effort: returns whether a button was clicked and never fails. A
/// zero timeout checks the page once without waiting.
pub async fn dismiss_consent(
    driver: &mut (dyn RenderDriver + '_),
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    match wait_for(driver, &Condition::ElementPresent(selector), timeout, poll_interval).await {
        Ok(WaitOutcome::Satisfied) => {}
        Ok(WaitOutcome::TimedOut) => return false,
        Err(e) => {
            tracing::debug!("Consent check failed: {}", e);
            return false;
        }
    }

    let buttons = match driver.find_elements(selector).await {
        Ok(buttons) => buttons,
        Err(e) => {
            tracing::debug!("Consent lookup failed: {}", e);
            return false;
        }
    };

    for button in buttons {
        match driver.click(button).await {
            Ok(()) => {
                tracing::info!("Dismissed consent prompt");
                return true;
            }
            Err(e) => tracing::debug!("Consent click failed: {}", e),
        }
    }
    false
}

async fn check(
    driver: &mut (dyn RenderDriver + '_),
    condition: &Condition<'_>,
) -> Result<bool, DriverError> {
    match condition {
        Condition::DocumentReady => {
            let state = driver.execute_script(scripts::READY_STATE, &[]).await?;
            Ok(matches!(state, Value::String(ref s) if s == "complete"))
        }
        Condition::ElementPresent(selector) => {
            Ok(!driver.find_elements(selector).await?.is_empty())
        }
        Condition::UrlMatches(pattern) => {
            let url = driver.current_url().await?;
            Ok(pattern.matches(&url))
        }
    }
}
