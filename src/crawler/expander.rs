//! Dynamic content expansion
//!
//! Client-rendered documentation pages ship with collapsed operation blocks,
//! schema boxes and ARIA toggles. Before a page is captured the expander
//! opens them with a bounded fixed-point iteration:
//!
//! 1. For up to `max-rounds` rounds, query each selector in order and click
//!    every element whose `aria-expanded` is `"false"`
//! 2. Stop early when a round opens nothing
//! 3. Settle between rounds
//! 4. Finish with one script-level sweep across all selectors, which
//!    catches elements revealed by the last round's clicks
//!
//! Stale and unclickable elements are skipped; only failures of the page
//! itself (timeouts, transport) abort the pass.

use crate::config::ExpansionConfig;
use crate::driver::{
    scripts, wait_for, Condition, DriverError, ElementRef, RenderDriver, ScriptArg, WaitOutcome,
};
use serde_json::Value;
use std::time::Duration;

/// What an expansion pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    /// Elements opened by the click rounds
    pub expanded: usize,
    /// Rounds actually run
    pub rounds: u32,
    /// Elements opened by the final sweep
    pub swept: usize,
    /// Elements skipped because the DOM changed under them
    pub stale_skipped: usize,
    /// Elements the driver could not click
    pub click_failures: usize,
    /// "Try it out" buttons clicked
    pub try_it_out: usize,
}

impl ExpansionReport {
    /// Elements opened in total
    pub fn total(&self) -> usize {
        self.expanded + self.swept
    }
}

/// Errors that concern one element rather than the page
fn is_element_local(err: &DriverError) -> bool {
    matches!(
        err,
        DriverError::StaleElement
            | DriverError::NoSuchElement(_)
            | DriverError::Unsupported(_)
            | DriverError::Script(_)
    )
}

/// Opens every collapsed element on the current page
///
/// # Arguments
///
/// * `driver` - Driver positioned on the page to expand
/// * `config` - Selectors, round cap and pauses
///
/// # Returns
///
/// * `Ok(ExpansionReport)` - Counts for this page
/// * `Err(DriverError)` - The page itself failed (timeout, transport)
pub async fn expand_all(
    driver: &mut (dyn RenderDriver + '_),
    config: &ExpansionConfig,
) -> Result<ExpansionReport, DriverError> {
    let mut report = ExpansionReport::default();

    for round in 1..=config.max_rounds {
        report.rounds = round;
        let mut opened = 0;

        for selector in &config.selectors {
            let handles = match driver.find_elements(selector).await {
                Ok(handles) => handles,
                Err(e) if is_element_local(&e) => {
                    tracing::debug!("Selector {} unavailable: {}", selector, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            for handle in handles {
                match expand_one(driver, handle, config.click_pause()).await {
                    Ok(true) => opened += 1,
                    Ok(false) => {}
                    Err(DriverError::StaleElement) => report.stale_skipped += 1,
                    Err(e) if is_element_local(&e) => {
                        tracing::trace!("Could not expand {} element: {}", selector, e);
                        report.click_failures += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        report.expanded += opened;
        tracing::debug!("Expansion round {}: {} element(s) opened", round, opened);

        if opened == 0 {
            break;
        }
        if round < config.max_rounds {
            tokio::time::sleep(config.round_settle()).await;
        }
    }

    tokio::time::sleep(config.final_settle()).await;

    if config.try_it_out {
        report.try_it_out = click_try_it_out(driver, &config.try_it_out_selector).await?;
    }

    if config.final_sweep {
        report.swept = final_sweep(driver, &config.selectors).await;
    }

    Ok(report)
}

/// Clicks one element if it is collapsed; returns whether it was
async fn expand_one(
    driver: &mut (dyn RenderDriver + '_),
    handle: ElementRef,
    click_pause: Duration,
) -> Result<bool, DriverError> {
    let state = driver.attribute(handle, "aria-expanded").await?;
    if state.as_deref() != Some("false") {
        return Ok(false);
    }

    driver.scroll_into_view(handle).await?;
    driver.click(handle).await?;
    tokio::time::sleep(click_pause).await;
    Ok(true)
}

async fn click_try_it_out(
    driver: &mut (dyn RenderDriver + '_),
    selector: &str,
) -> Result<usize, DriverError> {
    let buttons = match driver.find_elements(selector).await {
        Ok(buttons) => buttons,
        Err(e) if is_element_local(&e) => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut clicked = 0;
    for button in buttons {
        match driver.click(button).await {
            Ok(()) => clicked += 1,
            Err(e) if is_element_local(&e) => {
                tracing::trace!("Try-it-out click skipped: {}", e);
            }
            Err(e) => return Err(e),
        }
    }
    if clicked > 0 {
        tracing::debug!("Clicked {} try-it-out button(s)", clicked);
    }
    Ok(clicked)
}

/// Runs the script-level sweep; never fails the page
async fn final_sweep(driver: &mut (dyn RenderDriver + '_), selectors: &[String]) -> usize {
    let arg = ScriptArg::Json(Value::from(selectors.to_vec()));

    match driver.execute_script(scripts::EXPAND_SWEEP, &[arg]).await {
        Ok(count) => {
            let swept = count.as_u64().unwrap_or(0) as usize;
            if swept > 0 {
                tracing::debug!("Final sweep opened {} element(s)", swept);
            }
            swept
        }
        Err(DriverError::Unsupported(_)) => 0,
        Err(e) => {
            tracing::warn!("Final expansion sweep failed: {}", e);
            0
        }
    }
}

/// The rendered document of one iframe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// The iframe's `src` attribute as written, if it had one
    pub src: Option<String>,
    pub html: String,
}

/// Captures the rendered document of every iframe on the page
///
/// A frame that cannot be entered, or whose body never appears, is logged
/// and skipped. The driver is always switched back to the top-level
/// document; failing to do so is the only error returned.
pub async fn capture_frames(
    driver: &mut (dyn RenderDriver + '_),
    frame_timeout: Duration,
    poll_interval: Duration,
) -> Result<Vec<CapturedFrame>, DriverError> {
    let frames = match driver.find_elements("iframe").await {
        Ok(frames) => frames,
        Err(e) => {
            tracing::warn!("Could not enumerate iframes: {}", e);
            return Ok(Vec::new());
        }
    };

    let mut captured = Vec::with_capacity(frames.len());
    for (i, frame) in frames.into_iter().enumerate() {
        let src = driver.attribute(frame, "src").await.ok().flatten();
        match capture_frame(driver, frame, frame_timeout, poll_interval).await {
            Ok(html) => captured.push(CapturedFrame { src, html }),
            Err(e) => tracing::warn!("Skipping iframe {}: {}", i + 1, e),
        }
        driver.switch_to_default().await?;
    }

    Ok(captured)
}

async fn capture_frame(
    driver: &mut (dyn RenderDriver + '_),
    frame: ElementRef,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String, DriverError> {
    driver.switch_to_frame(frame).await?;

    let body = wait_for(driver, &Condition::ElementPresent("body"), timeout, poll_interval).await?;
    if body == WaitOutcome::TimedOut {
        return Err(DriverError::Timeout("iframe body never appeared".to_string()));
    }

    driver.outer_html().await
}
