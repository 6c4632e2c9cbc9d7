// src/runlog/mod.rs
//! Append-only run log: one `[timestamp] message` line per event.
//!
//! The text of each event is the contract the reconciliation pass reads
//! back, so every message is produced from a [`RunEvent`] rather than
//! formatted ad hoc at the call site.
pub mod report;

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub use report::{OutcomeStatus, RunReport, TickerOutcome};

pub const COMPLETED_MARKER: &str = "Completed processing ticker";
pub const TICKER_ERROR_MARKER: &str = "Error processing ticker";
pub const DOWNLOAD_ERROR_MARKER: &str = "Error downloading report for";
pub const NO_MATCH_MARKER: &str = "No matching company found";
pub const LOW_CONFIDENCE_MARKER: &str = "Low-confidence match for";
pub const FILE_EXISTS_MARKER: &str = "File already exists";

pub enum RunEvent<'a> {
    SessionStarted,
    IdentifiersLoaded { count: usize },
    DirectoryReady { path: &'a Path },
    Processing { ticker: &'a str },
    CompanyClicked { ticker: &'a str, name: &'a str },
    ShowOlderClicked,
    CandidatesFound { links: usize, headings: usize },
    FileExists { filename: &'a str },
    Downloaded { filename: &'a str, ticker: &'a str },
    DownloadError { ticker: &'a str, error: &'a dyn fmt::Display },
    Completed { ticker: &'a str },
    NoMatch { name: &'a str, ticker: &'a str },
    LowConfidence { name: &'a str, ticker: &'a str, candidate: &'a str, score: f64 },
    TickerError { ticker: &'a str, error: &'a dyn fmt::Display },
    FileCount { count: usize },
    Fatal { error: &'a dyn fmt::Display },
}

impl RunEvent<'_> {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunEvent::DownloadError { .. }
                | RunEvent::NoMatch { .. }
                | RunEvent::TickerError { .. }
                | RunEvent::Fatal { .. }
        )
    }
}

impl fmt::Display for RunEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::SessionStarted => write!(f, "Browser and context initialized."),
            RunEvent::IdentifiersLoaded { count } => {
                write!(f, "CSV file read and parsed ({count} identifiers).")
            }
            RunEvent::DirectoryReady { path } => {
                write!(f, "Downloads directory ready: {}", path.display())
            }
            RunEvent::Processing { ticker } => write!(f, "Processing ticker: {ticker}"),
            RunEvent::CompanyClicked { ticker, name } => {
                write!(f, "Company name link found and clicked: {name} (Ticker: {ticker})")
            }
            RunEvent::ShowOlderClicked => write!(f, "Show older reports button clicked."),
            RunEvent::CandidatesFound { links, headings } => {
                write!(f, "Found {links} download links and {headings} filenames.")
            }
            RunEvent::FileExists { filename } => write!(f, "{FILE_EXISTS_MARKER}: {filename}"),
            RunEvent::Downloaded { filename, ticker } => {
                write!(f, "Successfully downloaded: {filename} for {ticker}")
            }
            RunEvent::DownloadError { ticker, error } => {
                write!(f, "{DOWNLOAD_ERROR_MARKER} {ticker}: {error}")
            }
            RunEvent::Completed { ticker } => write!(f, "{COMPLETED_MARKER}: {ticker}"),
            RunEvent::NoMatch { name, ticker } => {
                write!(f, "{NO_MATCH_MARKER} for {name} (Ticker: {ticker})")
            }
            RunEvent::LowConfidence { name, ticker, candidate, score } => write!(
                f,
                "{LOW_CONFIDENCE_MARKER} {name} (Ticker: {ticker}): '{candidate}' scored {score:.3}"
            ),
            RunEvent::TickerError { ticker, error } => {
                write!(f, "{TICKER_ERROR_MARKER} {ticker}: {error}")
            }
            RunEvent::FileCount { count } => {
                write!(f, "Number of files in downloads directory: {count}")
            }
            RunEvent::Fatal { error } => write!(f, "Error: {error}"),
        }
    }
}

/// Render one log line. Embedded line breaks are flattened so each event
/// stays on exactly one line.
pub fn format_line(timestamp: DateTime<Utc>, message: &str) -> String {
    let flat = message.replace(['\r', '\n'], " ");
    format!(
        "[{}] {}\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        flat
    )
}

/// Append-only writer for the text log and, optionally, the JSON-lines
/// run report.
pub struct RunLog {
    path: PathBuf,
    file: File,
    report: Option<File>,
}

impl RunLog {
    /// Opens (or creates) the log in append mode. Existing content is kept.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self { path, file, report: None })
    }

    /// Also append a JSON line per finished identifier to `path`.
    pub fn with_report<P: AsRef<Path>>(mut self, path: P) -> std::io::Result<Self> {
        self.report = Some(open_append(path.as_ref())?);
        Ok(self)
    }

    pub fn event(&mut self, event: &RunEvent<'_>) {
        let message = event.to_string();
        if event.is_failure() || matches!(event, RunEvent::LowConfidence { .. }) {
            tracing::warn!("{}", message);
        } else {
            tracing::info!("{}", message);
        }
        self.append(&message);
    }

    /// Persist a finished identifier's outcome to the run report.
    pub fn record(&mut self, outcome: &TickerOutcome) {
        let Some(report) = self.report.as_mut() else { return };
        let written = serde_json::to_string(outcome)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(report, "{line}"));
        if let Err(e) = written {
            tracing::error!("Failed to append run report entry for {}: {}", outcome.ticker, e);
        }
    }

    fn append(&mut self, message: &str) {
        let line = format_line(Utc::now(), message);
        // A lost log line must not stop the run.
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            tracing::error!("Failed to append to {}: {}", self.path.display(), e);
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
