// src/session/http.rs
use super::{Download, ElementHandle, Session};
use crate::utils::error::SessionError;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) disclosure-harvester/0.1";
const REQUEST_TIMEOUT_SECS: u64 = 60;

static FORM_INPUT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("input[name]").expect("Failed to compile FORM_INPUT_SELECTOR")
});

// Group 1 marks the RFC 5987 `filename*` form, whose value is percent-encoded.
static DISPOSITION_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename(\*)?\s*=\s*(?:[\w-]+'[\w-]*')?"?([^";]+)"?"#)
        .expect("Failed to compile DISPOSITION_FILENAME_RE")
});

/// A response as seen by the session: final URL, the headers the session
/// cares about, and the body.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: Url,
    pub content_type: Option<String>,
    pub disposition: Option<String>,
    pub body: Vec<u8>,
}

impl Fetched {
    /// Attachments and non-HTML bodies are downloads, everything else is a page.
    fn is_download(&self) -> bool {
        let attachment = self
            .disposition
            .as_deref()
            .map(|d| d.trim().to_ascii_lowercase().starts_with("attachment"))
            .unwrap_or(false);
        let html = self
            .content_type
            .as_deref()
            .map(|c| c.to_ascii_lowercase().contains("html"))
            .unwrap_or(true);
        attachment || !html
    }

    fn suggested_filename(&self) -> String {
        if let Some(name) = self.disposition.as_deref().and_then(disposition_filename) {
            return name;
        }
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .unwrap_or_else(|| "download".to_string())
    }
}

/// Filename from a `Content-Disposition` value. The encoded `filename*`
/// form wins over a plain `filename` when both are present.
fn disposition_filename(disposition: &str) -> Option<String> {
    let mut plain = None;
    for caps in DISPOSITION_FILENAME_RE.captures_iter(disposition) {
        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        if caps.get(1).is_some() {
            match urlencoding::decode(value) {
                Ok(decoded) => return Some(decoded.into_owned()),
                Err(e) => tracing::debug!("Undecodable filename* value {:?}: {}", value, e),
            }
        } else if plain.is_none() {
            plain = Some(value.to_string());
        }
    }
    plain
}

/// The wire underneath an [`HttpSession`].
pub trait Transport {
    async fn get(&self, url: Url) -> Result<Fetched, SessionError>;
    async fn post_form(&self, url: Url, fields: &[(String, String)]) -> Result<Fetched, SessionError>;
}

/// reqwest-backed transport. One client, one cookie jar, for the whole run.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    async fn finish(response: reqwest::Response) -> Result<Fetched, SessionError> {
        let status = response.status();
        let url = response.url().clone();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            return Err(SessionError::Http(status, url.to_string()));
        }
        let content_type = header_value(response.headers(), header::CONTENT_TYPE);
        let disposition = header_value(response.headers(), header::CONTENT_DISPOSITION);
        let body = response.bytes().await?.to_vec();
        tracing::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(Fetched { url, content_type, disposition, body })
    }
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: Url) -> Result<Fetched, SessionError> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::finish(response).await
    }

    async fn post_form(&self, url: Url, fields: &[(String, String)]) -> Result<Fetched, SessionError> {
        tracing::debug!("POST {}", url);
        let response = self.client.post(url).form(fields).send().await?;
        Self::finish(response).await
    }
}

/// A download captured by the session, held in memory until saved.
#[derive(Debug)]
pub struct HttpDownload {
    suggested: String,
    body: Vec<u8>,
}

impl Download for HttpDownload {
    fn suggested_filename(&self) -> &str {
        &self.suggested
    }

    async fn save_as(self, path: &Path) -> Result<(), SessionError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write beside the target first so an interrupted save never
        // occupies the final name.
        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        tokio::fs::write(&partial, &self.body).await?;
        tokio::fs::rename(&partial, path).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Step {
    selector: String,
    index: usize,
}

#[derive(Debug, Clone)]
struct Locator {
    generation: u64,
    steps: Vec<Step>,
}

struct Page {
    url: Url,
    html: String,
    generation: u64,
}

#[derive(Debug, PartialEq)]
enum ClickAction {
    Follow(Url),
    Submit {
        url: Url,
        post: bool,
        fields: Vec<(String, String)>,
    },
    Inert,
}

/// Session over plain HTTP: pages are fetched, parsed with `scraper`, and
/// clicks are interpreted as link follows or form submissions.
pub struct HttpSession<T> {
    transport: T,
    page: Option<Page>,
    generation: u64,
    fields: HashMap<String, String>,
    handles: HashMap<u64, Locator>,
    next_handle: u64,
    armed: bool,
    pending: Option<HttpDownload>,
}

impl<T: Transport> HttpSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            page: None,
            generation: 0,
            fields: HashMap::new(),
            handles: HashMap::new(),
            next_handle: 0,
            armed: false,
            pending: None,
        }
    }

    /// Number of handles handed out and not yet released.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    #[cfg(test)]
    pub fn current_url(&self) -> Option<&Url> {
        self.page.as_ref().map(|p| &p.url)
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn page(&self) -> Result<&Page, SessionError> {
        self.page.as_ref().ok_or(SessionError::NoPage)
    }

    fn locator(&self, handle: &ElementHandle) -> Result<Locator, SessionError> {
        let page = self.page()?;
        match self.handles.get(&handle.id()) {
            Some(locator) if locator.generation == page.generation => Ok(locator.clone()),
            _ => Err(SessionError::StaleHandle(handle.id())),
        }
    }

    fn issue(&mut self, locator: Locator) -> ElementHandle {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(id, locator);
        ElementHandle::new(id)
    }

    fn accept(&mut self, fetched: Fetched) {
        if fetched.is_download() {
            let suggested = fetched.suggested_filename();
            tracing::debug!("Download started: {} ({} bytes)", suggested, fetched.body.len());
            if !self.armed {
                tracing::warn!("Download of {} arrived without a listener", suggested);
            }
            self.pending = Some(HttpDownload { suggested, body: fetched.body });
            return;
        }
        if self.armed {
            // A trigger that answers with a page leaves the archive in place,
            // so the remaining handles on it stay usable.
            tracing::warn!("Expected a download but {} returned a page", fetched.url);
            return;
        }
        self.generation += 1;
        self.fields.clear();
        self.page = Some(Page {
            url: fetched.url,
            html: String::from_utf8_lossy(&fetched.body).into_owned(),
            generation: self.generation,
        });
    }

    async fn perform(&mut self, action: ClickAction) -> Result<(), SessionError> {
        let fetched = match action {
            ClickAction::Follow(url) => self.transport.get(url).await?,
            ClickAction::Submit { url, post: true, fields } => {
                self.transport.post_form(url, &fields).await?
            }
            ClickAction::Submit { mut url, post: false, fields } => {
                if !fields.is_empty() {
                    url.set_query(None);
                    url.query_pairs_mut().extend_pairs(&fields);
                }
                self.transport.get(url).await?
            }
            ClickAction::Inert => {
                tracing::debug!("Click had no navigable target");
                return Ok(());
            }
        };
        self.accept(fetched);
        Ok(())
    }
}

fn parse_selector(selector: &str) -> Result<Selector, SessionError> {
    Selector::parse(selector).map_err(|e| SessionError::Selector(format!("{selector}: {e:?}")))
}

fn locate<'a>(doc: &'a Html, steps: &[Step]) -> Result<ElementRef<'a>, SessionError> {
    let mut current: Option<ElementRef<'a>> = None;
    for step in steps {
        let selector = parse_selector(&step.selector)?;
        let found = match current {
            None => doc.select(&selector).nth(step.index),
            Some(parent) => parent.select(&selector).nth(step.index),
        };
        current = Some(found.ok_or_else(|| SessionError::ElementNotFound(step.selector.clone()))?);
    }
    current.ok_or_else(|| SessionError::ElementNotFound("<empty locator>".to_string()))
}

fn click_action(
    element: ElementRef<'_>,
    base: &Url,
    filled: &HashMap<String, String>,
) -> Result<ClickAction, SessionError> {
    let anchor = std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|e| e.value().name() == "a" && e.value().attr("href").is_some());
    if let Some(anchor) = anchor {
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return Ok(ClickAction::Inert);
        }
        let url = base
            .join(href)
            .map_err(|e| SessionError::InvalidUrl(format!("{href}: {e}")))?;
        return Ok(ClickAction::Follow(url));
    }

    let name = element.value().name();
    let default_kind = if name == "button" { "submit" } else { "text" };
    let kind = element.value().attr("type").unwrap_or(default_kind).to_ascii_lowercase();
    if (name == "input" || name == "button") && kind == "submit" {
        if let Some(form) = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "form")
        {
            return form_submission(form, base, filled);
        }
    }
    Ok(ClickAction::Inert)
}

fn form_submission(
    form: ElementRef<'_>,
    base: &Url,
    filled: &HashMap<String, String>,
) -> Result<ClickAction, SessionError> {
    let action = form.value().attr("action").unwrap_or("").trim();
    let url = if action.is_empty() {
        base.clone()
    } else {
        base.join(action)
            .map_err(|e| SessionError::InvalidUrl(format!("{action}: {e}")))?
    };
    let post = form
        .value()
        .attr("method")
        .map(|m| m.eq_ignore_ascii_case("post"))
        .unwrap_or(false);

    let mut fields = Vec::new();
    for input in form.select(&FORM_INPUT_SELECTOR) {
        let Some(field) = input.value().attr("name") else { continue };
        let kind = input.value().attr("type").unwrap_or("text").to_ascii_lowercase();
        if matches!(kind.as_str(), "submit" | "button" | "image" | "reset" | "file") {
            continue;
        }
        if matches!(kind.as_str(), "checkbox" | "radio") && input.value().attr("checked").is_none() {
            continue;
        }
        let value = filled
            .get(field)
            .cloned()
            .unwrap_or_else(|| input.value().attr("value").unwrap_or("").to_string());
        fields.push((field.to_string(), value));
    }
    Ok(ClickAction::Submit { url, post, fields })
}

impl<T: Transport> Session for HttpSession<T> {
    type Download = HttpDownload;

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let target = match (Url::parse(url), self.page.as_ref()) {
            (Ok(absolute), _) => absolute,
            (Err(_), Some(page)) => page
                .url
                .join(url)
                .map_err(|e| SessionError::InvalidUrl(format!("{url}: {e}")))?,
            (Err(e), None) => return Err(SessionError::InvalidUrl(format!("{url}: {e}"))),
        };
        tracing::debug!("Navigating to {}", target);
        // An explicit navigation always replaces the page, even if a
        // download wait was abandoned.
        self.armed = false;
        let fetched = self.transport.get(target).await?;
        self.accept(fetched);
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str) -> Result<(), SessionError> {
        // Static pages are complete on arrival; presence is checked once.
        let page = self.page()?;
        let parsed = parse_selector(selector)?;
        let doc = Html::parse_document(&page.html);
        if doc.select(&parsed).next().is_some() {
            Ok(())
        } else {
            Err(SessionError::ElementNotFound(selector.to_string()))
        }
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), SessionError> {
        let field = {
            let page = self.page()?;
            let parsed = parse_selector(selector)?;
            let doc = Html::parse_document(&page.html);
            let element = doc
                .select(&parsed)
                .next()
                .ok_or_else(|| SessionError::ElementNotFound(selector.to_string()))?;
            element
                .value()
                .attr("name")
                .map(str::to_string)
                .ok_or_else(|| SessionError::ElementNotFound(format!("{selector} (no name attribute)")))?
        };
        self.fields.insert(field, text.to_string());
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), SessionError> {
        let action = {
            let page = self.page()?;
            let parsed = parse_selector(selector)?;
            let doc = Html::parse_document(&page.html);
            let element = doc
                .select(&parsed)
                .next()
                .ok_or_else(|| SessionError::ElementNotFound(selector.to_string()))?;
            click_action(element, &page.url, &self.fields)?
        };
        self.perform(action).await
    }

    async fn click_handle(&mut self, handle: &ElementHandle) -> Result<(), SessionError> {
        let locator = self.locator(handle)?;
        let action = {
            let page = self.page()?;
            let doc = Html::parse_document(&page.html);
            let element = locate(&doc, &locator.steps)?;
            click_action(element, &page.url, &self.fields)?
        };
        self.perform(action).await
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        let (generation, count) = {
            let page = self.page()?;
            let parsed = parse_selector(selector)?;
            let doc = Html::parse_document(&page.html);
            let count = doc.select(&parsed).count();
            (page.generation, count)
        };
        Ok((0..count)
            .map(|index| {
                self.issue(Locator {
                    generation,
                    steps: vec![Step { selector: selector.to_string(), index }],
                })
            })
            .collect())
    }

    async fn query_within(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        let parent_locator = self.locator(parent)?;
        let count = {
            let page = self.page()?;
            let parsed = parse_selector(selector)?;
            let doc = Html::parse_document(&page.html);
            let element = locate(&doc, &parent_locator.steps)?;
            let count = element.select(&parsed).count();
            count
        };
        Ok((0..count)
            .map(|index| {
                let mut steps = parent_locator.steps.clone();
                steps.push(Step { selector: selector.to_string(), index });
                self.issue(Locator { generation: parent_locator.generation, steps })
            })
            .collect())
    }

    async fn text_content(&mut self, handle: &ElementHandle) -> Result<String, SessionError> {
        let locator = self.locator(handle)?;
        let page = self.page()?;
        let doc = Html::parse_document(&page.html);
        let element = locate(&doc, &locator.steps)?;
        let text = element.text().collect::<String>();
        Ok(text)
    }

    async fn release(&mut self, handle: ElementHandle) {
        self.handles.remove(&handle.id());
    }

    fn arm_download(&mut self) {
        self.armed = true;
        self.pending = None;
    }

    async fn await_download(&mut self) -> Result<HttpDownload, SessionError> {
        self.armed = false;
        self.pending.take().ok_or(SessionError::NoDownload)
    }
}
