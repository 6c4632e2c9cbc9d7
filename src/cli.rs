// src/cli.rs
use crate::config::{DirLayout, HarvestConfig, Pacing, PairingMode, DEFAULT_BASE_URL, DEFAULT_MATCH_THRESHOLD};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Disclosure report harvester: resolve tickers on the report site, download
/// every archived report once, and reconcile the run log afterwards.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve every identifier and download its archived reports
    Harvest(HarvestArgs),
    /// Count outcomes from the run log and apply manual corrections
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// CSV with Symbol and Shortname columns
    #[arg(short, long, env = "HARVEST_INPUT", default_value = "data/SP500.csv")]
    pub input: PathBuf,

    /// Directory the reports are written to
    #[arg(short, long, env = "HARVEST_DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Append-only run log
    #[arg(short, long, env = "HARVEST_LOG", default_value = "webscraper.log")]
    pub log: PathBuf,

    /// JSON-lines run report, one entry per identifier
    #[arg(long, env = "HARVEST_REPORT", default_value = "run_report.jsonl")]
    pub report: PathBuf,

    /// Report site root
    #[arg(long, env = "HARVEST_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Minimum fuzzy-match score (0.0-1.0) to accept a search result
    #[arg(long, env = "HARVEST_MATCH_THRESHOLD", default_value_t = DEFAULT_MATCH_THRESHOLD)]
    pub match_threshold: f64,

    /// How headings are paired with download links
    #[arg(long, value_enum, env = "HARVEST_PAIRING", default_value_t = PairingMode::Rows)]
    pub pairing: PairingMode,

    /// Flat directory or one subdirectory per ticker
    #[arg(long, value_enum, env = "HARVEST_LAYOUT", default_value_t = DirLayout::Flat)]
    pub layout: DirLayout,

    /// Delay between report downloads, in milliseconds
    #[arg(long, env = "HARVEST_CANDIDATE_DELAY_MS", default_value_t = 1000)]
    pub candidate_delay_ms: u64,

    /// Delay between identifiers, in milliseconds
    #[arg(long, env = "HARVEST_TICKER_DELAY_MS", default_value_t = 2000)]
    pub ticker_delay_ms: u64,

    /// Wait after expanding older reports, in milliseconds
    #[arg(long, env = "HARVEST_SETTLE_MS", default_value_t = 3000)]
    pub settle_ms: u64,

    /// Give up on a download that has not started after this many seconds
    #[arg(long, env = "HARVEST_DOWNLOAD_TIMEOUT_SECS", default_value_t = 30)]
    pub download_timeout_secs: u64,

    /// Only process these tickers (repeatable)
    #[arg(long = "only")]
    pub only: Vec<String>,
}

impl HarvestArgs {
    pub fn config(&self) -> HarvestConfig {
        HarvestConfig {
            base_url: self.base_url.clone(),
            pacing: Pacing {
                between_candidates: Duration::from_millis(self.candidate_delay_ms),
                between_identifiers: Duration::from_millis(self.ticker_delay_ms),
                expand_settle: Duration::from_millis(self.settle_ms),
                download_timeout: Duration::from_secs(self.download_timeout_secs),
            },
            match_threshold: self.match_threshold,
            pairing: self.pairing,
            layout: self.layout,
            ..HarvestConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[arg(short, long, env = "HARVEST_DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    #[arg(short, long, env = "HARVEST_LOG", default_value = "webscraper.log")]
    pub log: PathBuf,

    #[arg(long, value_enum, env = "HARVEST_LAYOUT", default_value_t = DirLayout::Flat)]
    pub layout: DirLayout,

    /// Also summarise this JSON-lines run report
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Delete all files of this mis-resolved ticker (repeatable)
    #[arg(long = "correct")]
    pub correct: Vec<String>,

    /// File listing mis-resolved tickers, one per line
    #[arg(long)]
    pub corrections_file: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}
