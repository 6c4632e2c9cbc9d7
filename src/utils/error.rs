// src/utils/error.rs
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error {0} for {1}")]
    Http(reqwest::StatusCode, String), // e.g., 404 Not Found, 403 Forbidden

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("No element matches selector: {0}")]
    ElementNotFound(String),

    #[error("Element handle {0} is no longer attached to the current page")]
    StaleHandle(u64),

    #[error("No page has been loaded yet")]
    NoPage,

    #[error("No download started")]
    NoDownload,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a company name could not be resolved against the search results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionFailure {
    #[error("no candidate matched")]
    NoMatch,

    #[error("best candidate '{candidate}' scored {score:.3}, below threshold {threshold:.3}")]
    LowConfidence {
        candidate: String,
        score: f64,
        threshold: f64,
    },
}

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Resolution failed for {name} (Ticker: {ticker}): {reason}")]
    Resolution {
        ticker: String,
        name: String,
        reason: ResolutionFailure,
    },

    #[error("Navigation failed: {0}")]
    Navigation(#[from] SessionError),

    #[error("Download failed: {0}")]
    Download(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// Non-fatal findings of the reconciliation pass.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ReconcileWarning {
    #[error("Downloads directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Log file not found: {}", .0.display())]
    MissingLog(PathBuf),

    #[error("Could not extract ticker using regex from line: {0}")]
    LogParse(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Identifier source error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Browser session failed: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
