//! Headless Chrome render driver
//!
//! Drives a real browser over the DevTools protocol with `chromiumoxide`, so
//! client-rendered pages run their scripts and expansion clicks reach live
//! event handlers. Each driver launches its own browser process with its own
//! profile directory; one worker never sees another's cookies.
//!
//! Scripts follow the WebDriver convention the crawler's [`scripts`] use: a
//! function body that reads `arguments[n]` and may `return` a value. Frames
//! are entered through the iframe's `contentWindow`, which limits frame
//! capture to same-origin frames.
//!
//! [`scripts`]: super::scripts

use super::{DriverError, ElementRef, RenderDriver, ScriptArg};
use crate::config::DriverConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle index given to elements found inside a frame; they can be counted
/// but not interacted with
const FRAME_ELEMENT: usize = usize::MAX;

/// Status of the last top-level navigation, 0 when the browser does not say
const NAVIGATION_STATUS: &str = r#"
const entry = performance.getEntriesByType('navigation')[0];
return entry && entry.responseStatus ? entry.responseStatus : 0;
"#;

/// Render driver over a dedicated headless Chrome
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
    temporary_profile: bool,
    generation: u64,
    elements: Vec<Element>,
    frame: Option<usize>,
}

impl ChromeDriver {
    /// Launches a browser for one worker
    ///
    /// # Arguments
    ///
    /// * `config` - Executable, headless mode and profile location
    /// * `worker_id` - Picks the worker's profile directory
    /// * `request_timeout` - Upper bound on each DevTools request, navigation included
    ///
    /// # Returns
    ///
    /// * `Ok(ChromeDriver)` - Browser running with one blank tab
    /// * `Err(DriverError::Transport)` - The browser could not be started
    pub async fn launch(
        config: &DriverConfig,
        worker_id: usize,
        request_timeout: Duration,
    ) -> Result<Self, DriverError> {
        let profile_dir = config.profile_dir(worker_id);

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile_dir)
            .request_timeout(request_timeout)
            .window_size(1366, 900);
        if !config.headless {
            builder = builder.with_head();
        }
        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder
            .build()
            .map_err(|e| DriverError::Transport(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Transport(format!("launching browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;

        tracing::debug!(
            "Worker {} launched browser (profile {})",
            worker_id,
            profile_dir.display()
        );

        Ok(Self {
            browser,
            page,
            handler,
            profile_dir,
            temporary_profile: config.profile_root.is_none(),
            generation: 0,
            elements: Vec::new(),
            frame: None,
        })
    }

    fn element(&self, handle: ElementRef) -> Result<&Element, DriverError> {
        if handle.generation() != self.generation {
            return Err(DriverError::StaleElement);
        }
        if handle.index() == FRAME_ELEMENT {
            return Err(DriverError::Unsupported(
                "interacting with elements inside a frame".to_string(),
            ));
        }
        self.elements
            .get(handle.index())
            .ok_or_else(|| DriverError::NoSuchElement(format!("element {}", handle.index())))
    }

    fn selected_frame(&self) -> Result<Option<&Element>, DriverError> {
        match self.frame {
            Some(index) => self
                .elements
                .get(index)
                .map(Some)
                .ok_or_else(|| DriverError::NoSuchElement("selected frame".to_string())),
            None => Ok(None),
        }
    }

    async fn evaluate(&self, expression: String) -> Result<Value, DriverError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DriverError::Script)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RenderDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.frame = None;
        self.generation += 1;
        self.elements.clear();

        self.page.goto(url).await.map_err(map_cdp_error)?;

        let status = self
            .evaluate(page_expression(NAVIGATION_STATUS, &Value::Array(Vec::new())))
            .await?
            .as_u64()
            .unwrap_or(0);
        if status >= 400 {
            let landed = self.current_url().await?;
            return Err(DriverError::HttpStatus {
                url: landed,
                status: status as u16,
            });
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(map_cdp_error)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: &[ScriptArg],
    ) -> Result<Value, DriverError> {
        let (target, rest) = match args.split_first() {
            Some((ScriptArg::Element(handle), rest)) => (Some(*handle), rest),
            _ => (None, args),
        };
        let json_args = json_args(rest)?;

        if let Some(handle) = target {
            let element = self.element(handle)?;
            return call_on(element, element_function(script, &json_args)).await;
        }

        match self.selected_frame()? {
            Some(frame) => call_on(frame, frame_function(script, &json_args)).await,
            None => self.evaluate(page_expression(script, &json_args)).await,
        }
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>, DriverError> {
        if let Some(frame) = self.selected_frame()? {
            let count = call_on(frame, frame_count_function(selector)).await?;
            let count = count.as_u64().unwrap_or(0) as usize;
            return Ok(vec![ElementRef::new(self.generation, FRAME_ELEMENT); count]);
        }

        let found = match self.page.find_elements(selector).await {
            Ok(found) => found,
            Err(CdpError::NotFound) => Vec::new(),
            Err(e) => return Err(map_cdp_error(e)),
        };

        let start = self.elements.len();
        self.elements.extend(found);
        Ok((start..self.elements.len())
            .map(|i| ElementRef::new(self.generation, i))
            .collect())
    }

    async fn attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.element(element)?
            .attribute(name)
            .await
            .map_err(map_cdp_error)
    }

    async fn send_keys(&mut self, element: ElementRef, text: &str) -> Result<(), DriverError> {
        let element = self.element(element)?;
        element.click().await.map_err(map_cdp_error)?;
        element.type_str(text).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn switch_to_frame(&mut self, element: ElementRef) -> Result<(), DriverError> {
        let frame = self.element(element)?;
        let tag = call_on(frame, "function() { return this.tagName.toLowerCase(); }".to_string())
            .await?;
        match tag.as_str() {
            Some("iframe") | Some("frame") => {
                self.frame = Some(element.index());
                Ok(())
            }
            other => Err(DriverError::NoSuchElement(format!(
                "<{}> is not a frame",
                other.unwrap_or("?")
            ))),
        }
    }

    async fn switch_to_default(&mut self) -> Result<(), DriverError> {
        self.frame = None;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: ElementRef) -> Result<(), DriverError> {
        self.element(element)?
            .scroll_into_view()
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.elements.clear();
        self.frame = None;

        let closed = self.browser.close().await.map(|_| ()).map_err(map_cdp_error);
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser did not exit cleanly: {}", e);
        }
        self.handler.abort();

        if self.temporary_profile {
            if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
                tracing::debug!(
                    "Could not remove profile {}: {}",
                    self.profile_dir.display(),
                    e
                );
            }
        }
        closed
    }
}

/// Script arguments after the first as a JSON array
fn json_args(args: &[ScriptArg]) -> Result<Value, DriverError> {
    args.iter()
        .map(|arg| match arg {
            ScriptArg::Json(value) => Ok(value.clone()),
            ScriptArg::Element(_) => Err(DriverError::Unsupported(
                "element arguments after the first".to_string(),
            )),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Wraps a script body as an expression evaluated in the page
fn page_expression(script: &str, args: &Value) -> String {
    format!("(function() {{ {} }}).apply(null, {})", script, args)
}

/// Wraps a script body as a function called on an element, which becomes `arguments[0]`
fn element_function(script: &str, rest: &Value) -> String {
    format!(
        "function() {{ return (function() {{ {} }}).apply(null, [this].concat({})); }}",
        script, rest
    )
}

/// Wraps a script body so it runs in the realm of the iframe it is called on
fn frame_function(script: &str, args: &Value) -> String {
    format!(
        "function() {{ \
           const w = this.contentWindow; \
           if (!w || !w.document) {{ throw new Error('frame document unavailable'); }} \
           return new w.Function({}).apply(null, {}); \
         }}",
        Value::from(script),
        args
    )
}

/// Counts matches for a selector inside the iframe it is called on
fn frame_count_function(selector: &str) -> String {
    format!(
        "function() {{ const d = this.contentDocument; return d ? d.querySelectorAll({}).length : 0; }}",
        Value::from(selector)
    )
}

async fn call_on(element: &Element, function: String) -> Result<Value, DriverError> {
    let returns = element
        .call_js_fn(function, false)
        .await
        .map_err(map_cdp_error)?;
    if let Some(exception) = returns.exception_details {
        return Err(DriverError::Script(exception.text));
    }
    Ok(returns.result.value.unwrap_or(Value::Null))
}

fn is_stale_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("detached")
        || message.contains("could not find node")
        || message.contains("no node with given id")
}

fn map_cdp_error(err: CdpError) -> DriverError {
    match err {
        CdpError::Timeout => DriverError::Timeout("browser did not respond in time".to_string()),
        CdpError::NotFound => DriverError::NoSuchElement("node not found".to_string()),
        CdpError::JavascriptException(details) => DriverError::Script(details.text),
        other => {
            let message = other.to_string();
            if is_stale_message(&message) {
                DriverError::StaleElement
            } else if message.to_ascii_lowercase().contains("selector") {
                DriverError::Script(message)
            } else {
                DriverError::Transport(message)
            }
        }
    }
}
