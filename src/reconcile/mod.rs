// src/reconcile/mod.rs
//! Offline reconciliation over the run log and the download directory.
//!
//! Runs after one or more harvests, never alongside one. Everything it
//! knows comes from the log text, the files on disk, and optionally the
//! JSON-lines run report.
mod corrections;

pub use corrections::CorrectionSet;

use crate::config::DirLayout;
use crate::runlog::{RunReport, COMPLETED_MARKER, LOW_CONFIDENCE_MARKER, NO_MATCH_MARKER};
use crate::storage::DownloadStore;
use crate::utils::error::{AppError, ReconcileWarning, StorageError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

const ERROR_INDICATOR: &str = "Error";

// Ticker is in group 1 for "Error processing ticker X" (trailing colon
// excluded) and in group 2 for "No matching company found for N (Ticker: X)".
static FAILURE_TICKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Error processing ticker ([^:\s]+):?|No matching company found for .* \(Ticker: (\S+)\)")
        .expect("Failed to compile FAILURE_TICKER_RE")
});

static LOW_CONFIDENCE_TICKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Low-confidence match for .* \(Ticker: ([^)\s]+)\)")
        .expect("Failed to compile LOW_CONFIDENCE_TICKER_RE")
});

/// What the log says about a run (or several appended runs).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    /// Lines carrying the "ticker fully processed" marker.
    pub completed: usize,
    /// Lines carrying an error or no-match indicator.
    pub error_lines: usize,
    /// Distinct tickers recovered from failure lines.
    pub failing_tickers: BTreeSet<String>,
    /// Failure lines no pattern could attribute to a ticker.
    pub unparseable: Vec<String>,
    pub low_confidence: BTreeSet<String>,
}

/// Classify every line of `content`. An empty log yields all zeros.
pub fn scan_log(content: &str) -> LogSummary {
    let mut summary = LogSummary::default();

    for line in content.lines() {
        if line.contains(COMPLETED_MARKER) {
            summary.completed += 1;
        }

        if line.contains(ERROR_INDICATOR) || line.contains(NO_MATCH_MARKER) {
            summary.error_lines += 1;
            let ticker = FAILURE_TICKER_RE
                .captures(line)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                .map(|m| m.as_str().to_string());
            match ticker {
                Some(ticker) => {
                    summary.failing_tickers.insert(ticker);
                }
                None => summary.unparseable.push(line.to_string()),
            }
        } else if line.contains(LOW_CONFIDENCE_MARKER) {
            if let Some(caps) = LOW_CONFIDENCE_TICKER_RE.captures(line) {
                summary.low_confidence.insert(caps[1].to_string());
            }
        }
    }

    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    pub tickers: BTreeSet<String>,
    pub removed: usize,
    pub files_after: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub download_dir: PathBuf,
    pub layout: DirLayout,
    pub log_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub corrections: CorrectionSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub files: usize,
    pub log: LogSummary,
    pub correction: Option<CorrectionOutcome>,
    pub run_report: Option<RunReport>,
    pub warnings: Vec<ReconcileWarning>,
}

/// Count files, read the log, then apply the correction set if one is given.
pub fn reconcile(options: &ReconcileOptions) -> Result<Reconciliation, AppError> {
    let store = DownloadStore::at(&options.download_dir, options.layout);
    let mut warnings = Vec::new();

    let files = match count_files(&store)? {
        Some(count) => count,
        None => {
            warnings.push(ReconcileWarning::MissingDirectory(options.download_dir.clone()));
            0
        }
    };

    let log = match std::fs::read_to_string(&options.log_path) {
        Ok(content) => scan_log(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warnings.push(ReconcileWarning::MissingLog(options.log_path.clone()));
            LogSummary::default()
        }
        Err(e) => return Err(AppError::Io(e)),
    };
    warnings.extend(log.unparseable.iter().cloned().map(ReconcileWarning::LogParse));

    let run_report = match &options.report_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let report = RunReport::from_json_lines(&content)
                .map_err(|e| StorageError::SerializationError(format!("{}: {}", path.display(), e)))?;
            Some(report)
        }
        None => None,
    };

    let correction = if options.corrections.is_empty() {
        None
    } else {
        apply_corrections(&store, &options.corrections)?
    };

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    Ok(Reconciliation { files, log, correction, run_report, warnings })
}

/// `None` when the directory does not exist.
fn count_files(store: &DownloadStore) -> Result<Option<usize>, StorageError> {
    match store.count() {
        Ok(count) => Ok(Some(count)),
        Err(StorageError::MissingDirectory(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete every file attributed to a corrected ticker. Safe to repeat.
pub fn apply_corrections(
    store: &DownloadStore,
    corrections: &CorrectionSet,
) -> Result<Option<CorrectionOutcome>, StorageError> {
    if count_files(store)?.is_none() {
        return Ok(None);
    }
    let removed = store.remove_tickers(corrections.tickers())?;
    let files_after = store.count()?;
    tracing::info!(
        "Removed {} files for {} corrected tickers, {} remain",
        removed,
        corrections.len(),
        files_after
    );
    Ok(Some(CorrectionOutcome {
        tickers: corrections.tickers().clone(),
        removed,
        files_after,
    }))
}

fn join_or_none<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let joined = items.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of files in downloads directory: {}", self.files)?;
        writeln!(f, "Number of errors logged: {}", self.log.error_lines)?;
        writeln!(f, "Number of companies processed successfully: {}", self.log.completed)?;
        writeln!(
            f,
            "Tickers with errors ({}): {}",
            self.log.failing_tickers.len(),
            join_or_none(&self.log.failing_tickers)
        )?;
        writeln!(f, "Unattributed error lines: {}", self.log.unparseable.len())?;
        writeln!(
            f,
            "Low-confidence matches ({}): {}",
            self.log.low_confidence.len(),
            join_or_none(&self.log.low_confidence)
        )?;
        if let Some(report) = &self.run_report {
            writeln!(
                f,
                "Run report: {} completed, {} no match, {} low confidence, {} failed; {} files downloaded, {} skipped, {} failed",
                report.completed,
                report.no_match,
                report.low_confidence,
                report.failed,
                report.files_downloaded,
                report.files_skipped,
                report.files_failed
            )?;
        }
        if let Some(correction) = &self.correction {
            writeln!(
                f,
                "Number of files in downloads directory after removing manually located errors: {} ({} removed)",
                correction.files_after, correction.removed
            )?;
        }
        Ok(())
    }
}
