//! Render driver abstraction
//!
//! The crawler core only talks to a page through [`RenderDriver`]. A driver
//! owns one browsing context: a current document, an optional selected
//! frame, and the element handles it has handed out since the last
//! navigation.
//!
//! # Components
//!
//! - `RenderDriver`: the collaborator contract
//! - `ElementRef` / `ScriptArg`: opaque element handles and script arguments
//! - `DriverError`: driver-level failures, classified by the crawler
//! - `scripts`: the small set of scripts the crawler runs
//! - `wait_for`: bounded wait on a DOM or URL predicate
//! - `dismiss_consent`: best-effort click on a consent prompt
//! - `ChromeDriver`: a headless browser over the DevTools protocol
//! - `HttpDriver`: a script-less fallback over `reqwest`

mod chrome;
mod http;
mod wait;

#[cfg(test)]
pub(crate) mod fake;

pub use chrome::ChromeDriver;
pub use http::HttpDriver;
pub use wait::{dismiss_consent, wait_for, Condition, WaitOutcome};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Driver-level failures
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stale element reference")]
    StaleElement,

    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Unsupported by this driver: {0}")]
    Unsupported(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },
}

/// Handle to an element found by [`RenderDriver::find_elements`]
///
/// Handles are tied to the document generation they were found in. Using a
/// handle after the document has changed yields [`DriverError::StaleElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef {
    generation: u64,
    index: usize,
}

impl ElementRef {
    pub fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Argument passed to [`RenderDriver::execute_script`] as `arguments[n]`
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    Element(ElementRef),
    Json(Value),
}

/// Scripts the crawler runs through [`RenderDriver::execute_script`]
pub mod scripts {
    /// Returns `document.readyState`
    pub const READY_STATE: &str = "return document.readyState;";

    /// Returns the serialized top-level (or selected frame) document
    pub const OUTER_HTML: &str = "return document.documentElement.outerHTML;";

    /// Scrolls `arguments[0]` to the middle of the viewport
    pub const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({block: 'center'});";

    /// Clicks `arguments[0]`
    pub const CLICK: &str = "arguments[0].click();";

    /// Clicks every collapsed element matching any selector in `arguments[0]`
    /// and returns how many were clicked
    pub const EXPAND_SWEEP: &str = r#"
const selectors = arguments[0];
let clicked = 0;
for (const selector of selectors) {
  for (const el of document.querySelectorAll(selector)) {
    if (el.getAttribute('aria-expanded') === 'false') {
      try { el.click(); clicked += 1; } catch (e) {}
    }
  }
}
return clicked;
"#;
}

/// Controls one browsing context
///
/// Implementations are exclusively owned by a single worker; nothing here
/// needs to be `Sync`.
#[async_trait]
pub trait RenderDriver: Send {
    /// Loads a URL in the top-level context
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Returns the URL of the top-level document after redirects
    async fn current_url(&mut self) -> Result<String, DriverError>;

    /// Runs a script in the selected context
    async fn execute_script(
        &mut self,
        script: &str,
        args: &[ScriptArg],
    ) -> Result<Value, DriverError>;

    /// Returns handles for every element matching a CSS selector
    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>, DriverError>;

    /// Reads an attribute of an element
    async fn attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Types text into an input element
    async fn send_keys(&mut self, element: ElementRef, text: &str) -> Result<(), DriverError>;

    /// Selects an iframe element's document as the current context
    async fn switch_to_frame(&mut self, element: ElementRef) -> Result<(), DriverError>;

    /// Returns to the top-level document
    async fn switch_to_default(&mut self) -> Result<(), DriverError>;

    /// Clicks an element in place
    ///
    /// Used for toggles and prompts that change the current document. A
    /// driver that cannot click without leaving the page reports
    /// [`DriverError::Unsupported`] instead.
    async fn click(&mut self, element: ElementRef) -> Result<(), DriverError> {
        self.execute_script(scripts::CLICK, &[ScriptArg::Element(element)])
            .await
            .map(|_| ())
    }

    /// Activates a control that is expected to load a new document, such as
    /// a login form's submit button
    async fn submit(&mut self, element: ElementRef) -> Result<(), DriverError> {
        self.click(element).await
    }

    /// Scrolls an element into view
    async fn scroll_into_view(&mut self, element: ElementRef) -> Result<(), DriverError> {
        self.execute_script(scripts::SCROLL_INTO_VIEW, &[ScriptArg::Element(element)])
            .await
            .map(|_| ())
    }

    /// Returns the serialized document of the selected context
    async fn outer_html(&mut self) -> Result<String, DriverError> {
        match self.execute_script(scripts::OUTER_HTML, &[]).await? {
            Value::String(html) => Ok(html),
            other => Err(DriverError::Script(format!(
                "outerHTML returned {}",
                other
            ))),
        }
    }

    /// Releases the underlying browser resource
    async fn quit(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
