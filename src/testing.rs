// src/testing.rs
//! In-memory report site for tests: canned pages and report bodies served
//! through the [`Transport`] seam.
use crate::session::http::{Fetched, Transport};
use crate::utils::error::SessionError;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
enum Resource {
    Page(String),
    File { body: Vec<u8>, disposition: Option<String> },
}

#[derive(Default)]
pub struct StaticSite {
    resources: HashMap<String, Resource>,
    requests: Mutex<Vec<String>>,
    delays: Vec<(String, Duration)>,
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.resources.insert(normalise(url), Resource::Page(html.to_string()));
        self
    }

    pub fn file(mut self, url: &str, body: &[u8]) -> Self {
        self.resources.insert(
            normalise(url),
            Resource::File { body: body.to_vec(), disposition: None },
        );
        self
    }

    pub fn attachment(mut self, url: &str, filename: &str, body: &[u8]) -> Self {
        self.resources.insert(
            normalise(url),
            Resource::File {
                body: body.to_vec(),
                disposition: Some(format!("attachment; filename=\"{filename}\"")),
            },
        );
        self
    }

    /// Answer requests whose URL contains `fragment` only after `delay`.
    pub fn slow(mut self, fragment: &str, delay: Duration) -> Self {
        self.delays.push((fragment.to_string(), delay));
        self
    }

    async fn pause_for(&self, url: &Url) {
        let delay = self
            .delays
            .iter()
            .find(|(fragment, _)| url.as_str().contains(fragment.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests whose URL contains `fragment`.
    pub fn hits(&self, fragment: &str) -> usize {
        self.requests().iter().filter(|u| u.contains(fragment)).count()
    }

    fn serve(&self, url: Url) -> Result<Fetched, SessionError> {
        let key = normalise(url.as_str());
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(key.clone());
        }
        match self.resources.get(&key) {
            Some(Resource::Page(html)) => Ok(Fetched {
                url,
                content_type: Some("text/html; charset=utf-8".to_string()),
                disposition: None,
                body: html.clone().into_bytes(),
            }),
            Some(Resource::File { body, disposition }) => Ok(Fetched {
                url,
                content_type: Some("application/pdf".to_string()),
                disposition: disposition.clone(),
                body: body.clone(),
            }),
            None => Err(SessionError::Http(reqwest::StatusCode::NOT_FOUND, key)),
        }
    }
}

fn normalise(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl Transport for StaticSite {
    async fn get(&self, url: Url) -> Result<Fetched, SessionError> {
        self.pause_for(&url).await;
        self.serve(url)
    }

    async fn post_form(&self, url: Url, _fields: &[(String, String)]) -> Result<Fetched, SessionError> {
        self.pause_for(&url).await;
        self.serve(url)
    }
}

/// Report site fixture in the shape of the real one: a search form, a
/// results list, and company pages with an archive of reports.
pub struct SiteBuilder {
    site: StaticSite,
}

pub const SITE: &str = "https://reports.test";

impl SiteBuilder {
    pub fn new() -> Self {
        let home = r#"<html><body>
            <form action="/Companies" method="get">
              <input name="search" type="text" placeholder="Company or Ticker Symbol">
              <input type="submit" value="Search" aria-label="Submit button">
            </form></body></html>"#;
        Self { site: StaticSite::new().page(&format!("{SITE}/"), home) }
    }

    /// Search results for `ticker`, one link per `(display name, slug)`.
    pub fn search(mut self, ticker: &str, results: &[(&str, &str)]) -> Self {
        let items: String = results
            .iter()
            .map(|(name, slug)| {
                format!(r#"<li><span class="companyName"><a href="/Company/{slug}">{name}</a></span></li>"#)
            })
            .collect();
        let html = format!("<html><body><ul>{items}</ul></body></html>");
        self.site = self.site.page(&format!("{SITE}/Companies?search={ticker}"), &html);
        self
    }

    /// Company page whose archive lists `reports` as `(heading, file slug)`.
    /// A leading "Archived Reports" heading sits outside the rows.
    pub fn company(mut self, slug: &str, reports: &[(&str, &str)], show_older: bool) -> Self {
        let rows: String = reports
            .iter()
            .map(|(heading, file)| {
                format!(
                    r#"<li><span class="heading">{heading}</span>
                       <span class="btn_archived download"><a href="/files/{file}">Download</a></span></li>"#
                )
            })
            .collect();
        let older = if show_older {
            r#"<div class="show_older_reports">Show older reports</div>"#
        } else {
            ""
        };
        let html = format!(
            r#"<html><body><div class="archived_report_block">
                 <span class="heading">Archived Reports</span>
                 <div class="archived_report_content_block"><ul>{rows}</ul></div>{older}
               </div></body></html>"#
        );
        self.site = self.site.page(&format!("{SITE}/Company/{slug}"), &html);
        self
    }

    pub fn report(mut self, file: &str, body: &[u8]) -> Self {
        self.site = self.site.file(&format!("{SITE}/files/{file}"), body);
        self
    }

    pub fn raw_page(mut self, path: &str, html: &str) -> Self {
        self.site = self.site.page(&format!("{SITE}{path}"), html);
        self
    }

    pub fn attachment(mut self, file: &str, filename: &str, body: &[u8]) -> Self {
        self.site = self.site.attachment(&format!("{SITE}/files/{file}"), filename, body);
        self
    }

    pub fn slow(mut self, file: &str, delay: Duration) -> Self {
        self.site = self.site.slow(&format!("/files/{file}"), delay);
        self
    }

    pub fn build(self) -> StaticSite {
        self.site
    }
}
