// src/config.rs
use clap::ValueEnum;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.responsibilityreports.com";
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.80;

/// CSS selectors describing the report site. Defaults follow the layout of
/// responsibilityreports.com.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub search_input: String,
    pub search_button: String,
    pub result_names: String,
    pub archive_block: String,
    pub show_older: String,
    /// One element per archived report, containing both heading and trigger.
    pub archive_row: String,
    pub heading: String,
    pub download_trigger: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            search_input: r#"input[name="search"]"#.to_string(),
            search_button: r#"input[type="submit"][value="Search"]"#.to_string(),
            result_names: "span.companyName a".to_string(),
            archive_block: "div.archived_report_block".to_string(),
            show_older: "div.show_older_reports".to_string(),
            archive_row: "div.archived_report_content_block li".to_string(),
            heading: "span.heading".to_string(),
            download_trigger: "span.btn_archived.download a".to_string(),
        }
    }
}

/// Fixed delays. Blunt pacing, not adaptive backoff.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub between_candidates: Duration,
    pub between_identifiers: Duration,
    pub expand_settle: Duration,
    pub download_timeout: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_candidates: Duration::from_millis(1000),
            between_identifiers: Duration::from_millis(2000),
            expand_settle: Duration::from_millis(3000),
            download_timeout: Duration::from_secs(30),
        }
    }
}

impl Pacing {
    /// No delays at all; used by tests and dry runs against local fixtures.
    pub fn immediate() -> Self {
        Self {
            between_candidates: Duration::ZERO,
            between_identifiers: Duration::ZERO,
            expand_settle: Duration::ZERO,
            download_timeout: Duration::from_secs(5),
        }
    }
}

/// How archive headings are paired with download triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PairingMode {
    /// Heading and trigger read from the same archive row.
    Rows,
    /// Two independent lists; trigger `i` takes heading `i + 1`.
    Offset,
}

/// Where downloaded files land inside the download directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirLayout {
    /// `<dir>/<TICKER>_<name>`
    Flat,
    /// `<dir>/<TICKER>/<TICKER>_<name>`
    Ticker,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_url: String,
    pub selectors: Selectors,
    pub pacing: Pacing,
    pub match_threshold: f64,
    pub pairing: PairingMode,
    pub layout: DirLayout,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            selectors: Selectors::default(),
            pacing: Pacing::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            pairing: PairingMode::Rows,
            layout: DirLayout::Flat,
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(format!(
                "match threshold must be within 0.0..=1.0, got {}",
                self.match_threshold
            ));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(format!("invalid base URL: {}", self.base_url));
        }
        Ok(())
    }
}
