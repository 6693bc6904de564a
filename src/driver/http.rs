//! HTTP render driver
//!
//! A [`RenderDriver`] that fetches documents with `reqwest` and queries them
//! with `scraper`. It does not run JavaScript: the document is "rendered"
//! as soon as it is downloaded. What it does support:
//!
//! - Navigation with redirects followed and a cookie store, so a login
//!   session survives across pages
//! - `find_elements` / `attribute` over the current document or frame
//! - Typing into named inputs and submitting their form
//! - Following a link through [`RenderDriver::submit`] and iframe `src` loading
//!
//! Anything that needs a script engine reports [`DriverError::Unsupported`].
//! That includes in-place clicks: without scripts a click can only follow a
//! link or post a form, and either would replace the page being captured.

use super::{scripts, DriverError, ElementRef, RenderDriver, ScriptArg};
use async_trait::async_trait;
use reqwest::{Client, Method};
use scraper::{ElementRef as DomElement, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// A downloaded document
#[derive(Debug, Clone)]
struct Document {
    url: Url,
    html: String,
}

/// The form a submit control belongs to, captured when the control is found
#[derive(Debug, Clone)]
struct FormSnapshot {
    action: Option<String>,
    method: String,
    fields: Vec<(String, String)>,
}

/// An element found in the current generation
#[derive(Debug, Clone)]
struct ElementRecord {
    tag: String,
    attrs: HashMap<String, String>,
    base_url: Url,
    form: Option<FormSnapshot>,
}

impl ElementRecord {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn is_submit_control(&self) -> bool {
        match self.tag.as_str() {
            "button" => matches!(self.attr("type"), None | Some("submit")),
            "input" => matches!(self.attr("type"), Some("submit") | Some("image")),
            _ => false,
        }
    }
}

/// Script-less render driver over `reqwest`
pub struct HttpDriver {
    client: Client,
    top: Option<Document>,
    frame: Option<Document>,
    generation: u64,
    elements: Vec<ElementRecord>,
    typed: HashMap<String, String>,
}

impl HttpDriver {
    /// Creates a driver with its own cookie store
    ///
    /// # Arguments
    ///
    /// * `request_timeout` - Upper bound on each HTTP request
    ///
    /// # Returns
    ///
    /// * `Ok(HttpDriver)` - Ready to navigate
    /// * `Err(DriverError::Transport)` - The HTTP client could not be built
    pub fn new(request_timeout: Duration) -> Result<Self, DriverError> {
        let client = Client::builder()
            .user_agent(concat!("unfurl/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            top: None,
            frame: None,
            generation: 0,
            elements: Vec::new(),
            typed: HashMap::new(),
        })
    }

    fn context(&self) -> Option<&Document> {
        self.frame.as_ref().or(self.top.as_ref())
    }

    fn record(&self, handle: ElementRef) -> Result<&ElementRecord, DriverError> {
        if handle.generation() != self.generation {
            return Err(DriverError::StaleElement);
        }
        self.elements
            .get(handle.index())
            .ok_or_else(|| DriverError::NoSuchElement(format!("element {}", handle.index())))
    }

    async fn fetch(
        &self,
        method: Method,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<Document, DriverError> {
        let request = if method == Method::POST {
            self.client.post(url).form(fields)
        } else if fields.is_empty() {
            self.client.get(url)
        } else {
            self.client.get(url).query(fields)
        };

        let response = request.send().await.map_err(|e| map_request_error(url, e))?;
        let status = response.status();
        let final_url = response.url().clone();

        if status.is_client_error() || status.is_server_error() {
            return Err(DriverError::HttpStatus {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| map_request_error(url, e))?;

        tracing::trace!("Fetched {} ({} bytes)", final_url, html.len());
        Ok(Document {
            url: final_url,
            html,
        })
    }

    fn load(&mut self, document: Document) {
        self.top = Some(document);
        self.frame = None;
        self.generation += 1;
        self.elements.clear();
        self.typed.clear();
    }

    async fn submit_form(
        &mut self,
        form: FormSnapshot,
        base_url: Url,
    ) -> Result<(), DriverError> {
        let action = match form.action.as_deref().map(str::trim) {
            Some(action) if !action.is_empty() => base_url
                .join(action)
                .map_err(|e| DriverError::Script(format!("bad form action {}: {}", action, e)))?,
            _ => base_url,
        };

        let fields: Vec<(String, String)> = form
            .fields
            .into_iter()
            .map(|(name, value)| {
                let value = self.typed.get(&name).cloned().unwrap_or(value);
                (name, value)
            })
            .collect();

        let method = if form.method.eq_ignore_ascii_case("post") {
            Method::POST
        } else {
            Method::GET
        };

        tracing::debug!("Submitting form to {} ({} fields)", action, fields.len());
        let document = self.fetch(method, action.as_str(), &fields).await?;
        self.load(document);
        Ok(())
    }
}

#[async_trait]
impl RenderDriver for HttpDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let document = self.fetch(Method::GET, url, &[]).await?;
        self.load(document);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self
            .top
            .as_ref()
            .map(|d| d.url.to_string())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn execute_script(
        &mut self,
        script: &str,
        _args: &[ScriptArg],
    ) -> Result<Value, DriverError> {
        match script {
            scripts::READY_STATE => Ok(Value::from(if self.top.is_some() {
                "complete"
            } else {
                "loading"
            })),
            scripts::OUTER_HTML => Ok(Value::from(
                self.context().map(|d| d.html.clone()).unwrap_or_default(),
            )),
            _ => Err(DriverError::Unsupported("script execution".to_string())),
        }
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>, DriverError> {
        let document = match self.context() {
            Some(document) => document,
            None => return Ok(Vec::new()),
        };

        let found = collect_elements(&document.html, &document.url, selector)?;
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
        let record = self.record(element)?;
        if name == "value" {
            if let Some(typed) = record.attr("name").and_then(|n| self.typed.get(n)) {
                return Ok(Some(typed.clone()));
            }
        }
        Ok(record.attr(name).map(str::to_string))
    }

    async fn send_keys(&mut self, element: ElementRef, text: &str) -> Result<(), DriverError> {
        let record = self.record(element)?;
        if record.tag != "input" && record.tag != "textarea" {
            return Err(DriverError::Unsupported(format!(
                "typing into <{}>",
                record.tag
            )));
        }
        let name = record
            .attr("name")
            .ok_or_else(|| DriverError::Script("input has no name".to_string()))?
            .to_string();
        self.typed.insert(name, text.to_string());
        Ok(())
    }

    async fn switch_to_frame(&mut self, element: ElementRef) -> Result<(), DriverError> {
        let record = self.record(element)?;
        if record.tag != "iframe" && record.tag != "frame" {
            return Err(DriverError::NoSuchElement(format!(
                "<{}> is not a frame",
                record.tag
            )));
        }
        let src = record
            .attr("src")
            .and_then(|src| record.base_url.join(src).ok())
            .ok_or_else(|| DriverError::NoSuchElement("frame without src".to_string()))?;

        let document = self.fetch(Method::GET, src.as_str(), &[]).await?;
        self.frame = Some(document);
        Ok(())
    }

    async fn switch_to_default(&mut self) -> Result<(), DriverError> {
        self.frame = None;
        Ok(())
    }

    async fn click(&mut self, element: ElementRef) -> Result<(), DriverError> {
        let record = self.record(element)?;
        Err(DriverError::Unsupported(format!(
            "in-place click on <{}> without a script engine",
            record.tag
        )))
    }

    async fn submit(&mut self, element: ElementRef) -> Result<(), DriverError> {
        let record = self.record(element)?.clone();

        if record.tag == "a" {
            let target = record
                .attr("href")
                .and_then(|href| crate::url::resolve_link(href, &record.base_url));
            return match target {
                Some(target) => self.navigate(target.as_str()).await,
                None => Ok(()),
            };
        }

        if record.is_submit_control() {
            if let Some(form) = record.form {
                return self.submit_form(form, record.base_url).await;
            }
        }

        Err(DriverError::Unsupported(format!("submit on <{}>", record.tag)))
    }

    async fn scroll_into_view(&mut self, element: ElementRef) -> Result<(), DriverError> {
        self.record(element).map(|_| ())
    }
}

fn map_request_error(url: &str, err: reqwest::Error) -> DriverError {
    if err.is_timeout() {
        DriverError::Timeout(format!("{}: {}", url, err))
    } else {
        DriverError::Transport(format!("{}: {}", url, err))
    }
}

/// Finds every element matching a selector and snapshots what later
/// interactions need
fn collect_elements(
    html: &str,
    base_url: &Url,
    selector: &str,
) -> Result<Vec<ElementRecord>, DriverError> {
    let selector = Selector::parse(selector)
        .map_err(|e| DriverError::Script(format!("invalid selector {}: {:?}", selector, e)))?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .map(|element| {
            let mut record = ElementRecord {
                tag: element.value().name().to_ascii_lowercase(),
                attrs: element
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                base_url: base_url.clone(),
                form: None,
            };
            if record.is_submit_control() {
                record.form = enclosing_form(element).map(snapshot_form);
            }
            record
        })
        .collect())
}

fn enclosing_form(element: DomElement<'_>) -> Option<DomElement<'_>> {
    element
        .ancestors()
        .filter_map(DomElement::wrap)
        .find(|e| e.value().name().eq_ignore_ascii_case("form"))
}

fn snapshot_form(form: DomElement<'_>) -> FormSnapshot {
    let mut fields = Vec::new();

    if let Ok(selector) = Selector::parse("input[name], select[name], textarea[name]") {
        for field in form.select(&selector) {
            let el = field.value();
            let input_type = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            match input_type.as_str() {
                "submit" | "button" | "image" | "reset" | "file" => continue,
                "checkbox" | "radio" if el.attr("checked").is_none() => continue,
                _ => {}
            }
            if let Some(name) = el.attr("name") {
                let value = el.attr("value").unwrap_or_default().to_string();
                fields.push((name.to_string(), value));
            }
        }
    }

    FormSnapshot {
        action: form.value().attr("action").map(str::to_string),
        method: form.value().attr("method").unwrap_or("get").to_string(),
        fields,
    }
}
