// src/runlog/report.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    NoMatch,
    LowConfidence,
    Failed,
}

/// What happened to one identifier in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerOutcome {
    pub ticker: String,
    pub company_name: String,
    pub status: OutcomeStatus,
    pub matched_name: Option<String>,
    pub score: Option<f64>,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Names of the files saved by this run.
    #[serde(default)]
    pub files: Vec<String>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl TickerOutcome {
    pub fn new(ticker: &str, company_name: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            company_name: company_name.to_string(),
            status: OutcomeStatus::Failed,
            matched_name: None,
            score: None,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            files: Vec::new(),
            error: None,
            finished_at: Utc::now(),
        }
    }
}

/// Totals over a run, rebuilt from [`TickerOutcome`]s.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub completed: usize,
    pub no_match: usize,
    pub low_confidence: usize,
    pub failed: usize,
    pub files_downloaded: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    /// Tickers needing attention: anything not `Completed`, first-seen order.
    pub attention: Vec<String>,
}

impl RunReport {
    pub fn add(&mut self, outcome: &TickerOutcome) {
        match outcome.status {
            OutcomeStatus::Completed => self.completed += 1,
            OutcomeStatus::NoMatch => self.no_match += 1,
            OutcomeStatus::LowConfidence => self.low_confidence += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.files_downloaded += outcome.downloaded;
        self.files_skipped += outcome.skipped;
        self.files_failed += outcome.failed;
        if outcome.status != OutcomeStatus::Completed && !self.attention.contains(&outcome.ticker) {
            self.attention.push(outcome.ticker.clone());
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.no_match + self.low_confidence + self.failed
    }

    /// Rebuild totals from JSON lines. Blank lines are skipped; a line that
    /// does not parse is returned as an error with its 1-based number.
    pub fn from_json_lines(content: &str) -> Result<Self, String> {
        let mut report = Self::default();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let outcome: TickerOutcome = serde_json::from_str(line)
                .map_err(|e| format!("line {}: {}", number + 1, e))?;
            report.add(&outcome);
        }
        Ok(report)
    }
}
