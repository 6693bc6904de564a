//! Scripted in-memory driver for unit tests
//!
//! Pages are registered up front with the elements they contain. Elements
//! match selectors by exact string, so tests spell out the selector the
//! code under test will ask for.

use super::{scripts, DriverError, ElementRef, RenderDriver, ScriptArg};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub(crate) enum ClickAction {
    Nothing,
    Toggle,
    Navigate(String),
}

#[derive(Debug, Clone)]
pub(crate) struct FakeElement {
    selector: String,
    attrs: HashMap<String, String>,
    hidden: bool,
    reveals: Vec<usize>,
    action: ClickAction,
    stale: bool,
    frame: Option<String>,
}

impl FakeElement {
    pub(crate) fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attrs: HashMap::new(),
            hidden: false,
            reveals: Vec::new(),
            action: ClickAction::Nothing,
            stale: false,
            frame: None,
        }
    }

    pub(crate) fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// `aria-expanded="false"`, toggled open by a click
    pub(crate) fn collapsed(self) -> Self {
        let mut el = self.attr("aria-expanded", "false");
        el.action = ClickAction::Toggle;
        el
    }

    pub(crate) fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Makes the element at `index` on the same page visible when clicked
    pub(crate) fn reveals(mut self, index: usize) -> Self {
        self.reveals.push(index);
        self
    }

    pub(crate) fn navigates_to(mut self, url: &str) -> Self {
        self.action = ClickAction::Navigate(url.to_string());
        self
    }

    /// Every interaction reports a stale reference
    pub(crate) fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    /// An iframe whose document is `html`
    pub(crate) fn frame(mut self, html: &str) -> Self {
        self.frame = Some(html.to_string());
        self
    }

    fn matches(&self, selector: &str) -> bool {
        !self.hidden && self.selector == selector
    }

    fn label(&self) -> String {
        self.attrs
            .get("id")
            .cloned()
            .unwrap_or_else(|| self.selector.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakePage {
    html: String,
    elements: Vec<FakeElement>,
    ready_after: u32,
}

impl FakePage {
    pub(crate) fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            elements: Vec::new(),
            ready_after: 0,
        }
    }

    pub(crate) fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Reports `loading` for the first `polls` readiness checks
    pub(crate) fn ready_after(mut self, polls: u32) -> Self {
        self.ready_after = polls;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeFailure {
    Timeout,
    Transport,
    Status(u16),
}

impl FakeFailure {
    fn to_error(self, url: &str) -> DriverError {
        match self {
            Self::Timeout => DriverError::Timeout(url.to_string()),
            Self::Transport => DriverError::Transport(format!("connection reset: {}", url)),
            Self::Status(status) => DriverError::HttpStatus {
                url: url.to_string(),
                status,
            },
        }
    }
}

/// Everything the fake was asked to do
#[derive(Debug, Default)]
pub(crate) struct FakeLog {
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub typed: Vec<String>,
    pub sweeps: usize,
    pub default_switches: usize,
    pub quit_calls: usize,
}

impl FakeLog {
    pub(crate) fn navigations_to(&self, url: &str) -> usize {
        self.navigations.iter().filter(|u| u.as_str() == url).count()
    }
}

#[derive(Debug)]
pub(crate) struct FakeDriver {
    pages: HashMap<String, FakePage>,
    redirects: HashMap<String, (String, usize)>,
    failures: HashMap<String, VecDeque<FakeFailure>>,
    current_url: Option<String>,
    generation: u64,
    elements: Vec<FakeElement>,
    ready_polls_left: u32,
    frame: Option<String>,
    sweep_supported: bool,
    scripts_fail: bool,
    log: Arc<Mutex<FakeLog>>,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        Self {
            pages: HashMap::new(),
            redirects: HashMap::new(),
            failures: HashMap::new(),
            current_url: None,
            generation: 0,
            elements: Vec::new(),
            ready_polls_left: 0,
            frame: None,
            sweep_supported: true,
            scripts_fail: false,
            log: Arc::new(Mutex::new(FakeLog::default())),
        }
    }

    pub(crate) fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// The next navigation to `from` lands on `to` instead
    pub(crate) fn redirect_once(self, from: &str, to: &str) -> Self {
        self.redirect_times(from, to, 1)
    }

    /// The next `times` navigations to `from` land on `to` instead
    pub(crate) fn redirect_times(mut self, from: &str, to: &str, times: usize) -> Self {
        self.redirects
            .insert(from.to_string(), (to.to_string(), times));
        self
    }

    fn redirect_target(&mut self, url: &str) -> String {
        match self.redirects.get_mut(url) {
            Some((to, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                to.clone()
            }
            _ => url.to_string(),
        }
    }

    /// The next `times` navigations to `url` fail
    pub(crate) fn fail_navigation(mut self, url: &str, failure: FakeFailure, times: usize) -> Self {
        self.failures
            .entry(url.to_string())
            .or_default()
            .extend(std::iter::repeat(failure).take(times));
        self
    }

    pub(crate) fn without_sweep(mut self) -> Self {
        self.sweep_supported = false;
        self
    }

    pub(crate) fn fail_scripts_with_transport(&mut self) {
        self.scripts_fail = true;
    }

    pub(crate) fn log(&self) -> Arc<Mutex<FakeLog>> {
        Arc::clone(&self.log)
    }

    /// Current `aria-expanded` values of the page's elements, hidden ones included
    pub(crate) fn expanded_states(&self) -> Vec<Option<String>> {
        self.elements
            .iter()
            .map(|e| e.attrs.get("aria-expanded").cloned())
            .collect()
    }

    fn record<F: FnOnce(&mut FakeLog)>(&self, f: F) {
        let mut log = self.log.lock().unwrap();
        f(&mut log);
    }

    fn element_mut(&mut self, handle: ElementRef) -> Result<&mut FakeElement, DriverError> {
        if handle.generation() != self.generation {
            return Err(DriverError::StaleElement);
        }
        let el = self
            .elements
            .get_mut(handle.index())
            .ok_or_else(|| DriverError::NoSuchElement(format!("index {}", handle.index())))?;
        if el.stale {
            return Err(DriverError::StaleElement);
        }
        Ok(el)
    }

    fn toggle(&mut self, index: usize) {
        let reveals = match self.elements.get_mut(index) {
            Some(el) => {
                el.attrs
                    .insert("aria-expanded".to_string(), "true".to_string());
                el.reveals.clone()
            }
            None => return,
        };
        for r in reveals {
            if let Some(el) = self.elements.get_mut(r) {
                el.hidden = false;
            }
        }
    }

    async fn click_element(&mut self, handle: ElementRef) -> Result<(), DriverError> {
        let el = self.element_mut(handle)?;
        let label = el.label();
        let action = el.action.clone();
        self.record(|log| log.clicks.push(label));

        match action {
            ClickAction::Nothing => Ok(()),
            ClickAction::Toggle => {
                self.toggle(handle.index());
                Ok(())
            }
            ClickAction::Navigate(url) => self.navigate(&url).await,
        }
    }

    fn sweep(&mut self, selectors: &Value) -> Result<Value, DriverError> {
        if !self.sweep_supported {
            return Err(DriverError::Unsupported("script execution".to_string()));
        }
        self.record(|log| log.sweeps += 1);

        let selectors: Vec<String> = selectors
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut clicked = 0u64;
        for selector in &selectors {
            for index in 0..self.elements.len() {
                let el = &self.elements[index];
                if el.stale || !el.matches(selector) {
                    continue;
                }
                if el.attrs.get("aria-expanded").map(String::as_str) == Some("false") {
                    self.toggle(index);
                    clicked += 1;
                }
            }
        }
        Ok(Value::from(clicked))
    }

    fn handle_arg(args: &[ScriptArg]) -> Result<ElementRef, DriverError> {
        match args.first() {
            Some(ScriptArg::Element(handle)) => Ok(*handle),
            _ => Err(DriverError::Script("expected an element argument".to_string())),
        }
    }
}

#[async_trait]
impl RenderDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.record(|log| log.navigations.push(url.to_string()));

        if let Some(failure) = self.failures.get_mut(url).and_then(VecDeque::pop_front) {
            return Err(failure.to_error(url));
        }

        let target = self.redirect_target(url);
        let page = self
            .pages
            .get(&target)
            .cloned()
            .ok_or_else(|| DriverError::HttpStatus {
                url: target.clone(),
                status: 404,
            })?;

        self.current_url = Some(target);
        self.generation += 1;
        self.elements = page.elements;
        self.ready_polls_left = page.ready_after;
        self.frame = None;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self
            .current_url
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: &[ScriptArg],
    ) -> Result<Value, DriverError> {
        if self.scripts_fail {
            return Err(DriverError::Transport("browser went away".to_string()));
        }

        match script {
            scripts::READY_STATE => {
                if self.ready_polls_left > 0 {
                    self.ready_polls_left -= 1;
                    Ok(Value::from("loading"))
                } else {
                    Ok(Value::from("complete"))
                }
            }
            scripts::OUTER_HTML => {
                let html = match (&self.frame, &self.current_url) {
                    (Some(frame), _) => frame.clone(),
                    (None, Some(url)) => self
                        .pages
                        .get(url)
                        .map(|p| p.html.clone())
                        .unwrap_or_default(),
                    (None, None) => String::new(),
                };
                Ok(Value::from(html))
            }
            scripts::CLICK => {
                let handle = Self::handle_arg(args)?;
                self.click_element(handle).await?;
                Ok(Value::Null)
            }
            scripts::SCROLL_INTO_VIEW => {
                let handle = Self::handle_arg(args)?;
                self.element_mut(handle)?;
                Ok(Value::Null)
            }
            scripts::EXPAND_SWEEP => match args.first() {
                Some(ScriptArg::Json(selectors)) => self.sweep(selectors),
                _ => Err(DriverError::Script("expected selector list".to_string())),
            },
            other => Err(DriverError::Unsupported(other.to_string())),
        }
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>, DriverError> {
        if let Some(frame) = &self.frame {
            let has_body = selector == "body" && frame.contains("<body");
            return Ok(if has_body {
                vec![ElementRef::new(self.generation, usize::MAX)]
            } else {
                Vec::new()
            });
        }

        Ok(self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.matches(selector))
            .map(|(i, _)| ElementRef::new(self.generation, i))
            .collect())
    }

    async fn attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.element_mut(element)?.attrs.get(name).cloned())
    }

    async fn send_keys(&mut self, element: ElementRef, text: &str) -> Result<(), DriverError> {
        let el = self.element_mut(element)?;
        el.attrs.insert("value".to_string(), text.to_string());
        self.record(|log| log.typed.push(text.to_string()));
        Ok(())
    }

    async fn switch_to_frame(&mut self, element: ElementRef) -> Result<(), DriverError> {
        let frame = self.element_mut(element)?.frame.clone();
        match frame {
            Some(html) => {
                self.frame = Some(html);
                Ok(())
            }
            None => Err(DriverError::NoSuchElement("frame document".to_string())),
        }
    }

    async fn switch_to_default(&mut self) -> Result<(), DriverError> {
        self.frame = None;
        self.record(|log| log.default_switches += 1);
        Ok(())
    }

    async fn click(&mut self, element: ElementRef) -> Result<(), DriverError> {
        self.click_element(element).await
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.record(|log| log.quit_calls += 1);
        Ok(())
    }
}
