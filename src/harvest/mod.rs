// src/harvest/mod.rs
//! Per-identifier pipeline: resolve, expand, extract, download.
pub mod archive;
pub mod download;
pub mod models;
pub mod resolver;

use crate::config::HarvestConfig;
use crate::runlog::{OutcomeStatus, RunEvent, RunLog, RunReport, TickerOutcome};
use crate::session::Session;
use crate::storage::DownloadStore;
use crate::utils::error::{HarvestError, ResolutionFailure};
use chrono::Utc;

pub use models::Identifier;

/// Drives one session over a batch of identifiers, strictly in order.
pub struct Harvester<S> {
    session: S,
    store: DownloadStore,
    log: RunLog,
    config: HarvestConfig,
    report: RunReport,
}

impl<S: Session> Harvester<S> {
    pub fn new(session: S, store: DownloadStore, log: RunLog, config: HarvestConfig) -> Self {
        Self {
            session,
            store,
            log,
            config,
            report: RunReport::default(),
        }
    }

    pub fn log(&mut self) -> &mut RunLog {
        &mut self.log
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Process every identifier. Individual failures are logged and the
    /// batch carries on; the returned totals mirror what the log records.
    pub async fn run(&mut self, identifiers: &[Identifier]) -> RunReport {
        for (position, identifier) in identifiers.iter().enumerate() {
            let outcome = self.process(identifier).await;
            self.log.record(&outcome);
            self.report.add(&outcome);

            if position + 1 < identifiers.len() {
                tokio::time::sleep(self.config.pacing.between_identifiers).await;
            }
        }
        self.report.clone()
    }

    /// Run the whole pipeline for one identifier and log how it ended.
    pub async fn process(&mut self, identifier: &Identifier) -> TickerOutcome {
        let ticker = identifier.ticker.as_str();
        self.log.event(&RunEvent::Processing { ticker });

        let mut outcome = TickerOutcome::new(ticker, &identifier.company_name);
        match self.harvest(identifier, &mut outcome).await {
            Ok(()) => {
                outcome.status = OutcomeStatus::Completed;
                self.log.event(&RunEvent::Completed { ticker });
            }
            Err(e) => {
                outcome.error = Some(e.to_string());
                match &e {
                    HarvestError::Resolution { reason: ResolutionFailure::NoMatch, .. } => {
                        outcome.status = OutcomeStatus::NoMatch;
                        self.log.event(&RunEvent::NoMatch { name: &identifier.company_name, ticker });
                    }
                    HarvestError::Resolution {
                        reason: ResolutionFailure::LowConfidence { candidate, score, .. },
                        ..
                    } => {
                        outcome.status = OutcomeStatus::LowConfidence;
                        outcome.matched_name = Some(candidate.clone());
                        outcome.score = Some(*score);
                        self.log.event(&RunEvent::LowConfidence {
                            name: &identifier.company_name,
                            ticker,
                            candidate,
                            score: *score,
                        });
                    }
                    _ => {
                        outcome.status = OutcomeStatus::Failed;
                        self.log.event(&RunEvent::TickerError { ticker, error: &e });
                    }
                }
            }
        }
        outcome.finished_at = Utc::now();
        outcome
    }

    async fn harvest(&mut self, identifier: &Identifier, outcome: &mut TickerOutcome) -> Result<(), HarvestError> {
        let resolved = resolver::resolve(&mut self.session, &self.config, identifier).await?;
        self.log.event(&RunEvent::CompanyClicked {
            ticker: &resolved.ticker,
            name: &resolved.matched_name,
        });
        outcome.score = Some(resolved.score);
        outcome.matched_name = Some(resolved.matched_name);

        if archive::expand(&mut self.session, &self.config).await? {
            self.log.event(&RunEvent::ShowOlderClicked);
        }

        let candidates = archive::extract(&mut self.session, &self.config).await?;
        let headings = candidates.iter().filter(|c| c.heading.is_some()).count();
        self.log.event(&RunEvent::CandidatesFound { links: candidates.len(), headings });

        let tally = download::download_all(
            &mut self.session,
            &self.store,
            &mut self.log,
            &self.config,
            &identifier.ticker,
            candidates,
        )
        .await;

        outcome.downloaded = tally.downloaded;
        outcome.skipped = tally.skipped;
        outcome.failed = tally.failed;
        outcome.files = tally.files.into_iter().map(|f| f.filename).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirLayout, HarvestConfig, Pacing};
    use crate::reconcile;
    use crate::session::http::HttpSession;
    use crate::testing::{SiteBuilder, StaticSite, SITE};
    use std::path::Path;

    fn site() -> StaticSite {
        SiteBuilder::new()
            .search("ABC", &[("Abc Holdings", "abc-holdings"), ("ABC Corp", "abc-corp")])
            .company("abc-corp", &[("2023 Annual Report", "abc23.pdf"), ("2022 Annual Report", "abc22.pdf")], true)
            .report("abc23.pdf", b"abc23")
            .report("abc22.pdf", b"abc22")
            .search("NONE", &[])
            // Search page for BRKN exists, company page does not.
            .search("BRKN", &[("Broken Inc", "broken")])
            .search("XYZ", &[("Xyz Industries", "xyz")])
            .company("xyz", &[("2021 Sustainability Report", "xyz21.pdf"), ("2020 Sustainability Report", "gone.pdf")], false)
            .report("xyz21.pdf", b"xyz21")
            .build()
    }

    fn identifiers() -> Vec<Identifier> {
        vec![
            Identifier::new("ABC", "ABC Corp"),
            Identifier::new("NONE", "Nobody Ltd"),
            Identifier::new("BRKN", "Broken Inc"),
            Identifier::new("XYZ", "Xyz Industries"),
        ]
    }

    fn harvester(dir: &Path) -> Harvester<HttpSession<StaticSite>> {
        let config = HarvestConfig {
            base_url: format!("{SITE}/"),
            pacing: Pacing::immediate(),
            ..HarvestConfig::default()
        };
        let store = DownloadStore::create(dir.join("downloads"), DirLayout::Flat).unwrap();
        let log = RunLog::open(dir.join("run.log"))
            .unwrap()
            .with_report(dir.join("run.jsonl"))
            .unwrap();
        Harvester::new(HttpSession::new(site()), store, log, config)
    }

    #[tokio::test]
    async fn batch_survives_individual_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut harvester = harvester(dir.path());

        let report = harvester.run(&identifiers()).await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.no_match, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.files_downloaded, 3);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.attention, vec!["NONE", "BRKN"]);
        assert_eq!(harvester.session().live_handles(), 0);

        let log = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(log.contains("No matching company found for Nobody Ltd (Ticker: NONE)"));
        assert!(log.contains("Error processing ticker BRKN: "));
        assert!(log.contains("Completed processing ticker: XYZ"));
        assert!(log.contains("Show older reports button clicked."));
        assert!(dir.path().join("downloads").join("ABC_2023 Annual Report.pdf").exists());
        assert!(dir.path().join("downloads").join("XYZ_2021 Sustainability Report.pdf").exists());
    }

    #[tokio::test]
    async fn rerun_is_idempotent_and_log_reconciles() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");

        harvester(dir.path()).run(&identifiers()).await;
        let after_first = DownloadStore::at(&downloads, DirLayout::Flat).files().unwrap();

        let mut second = harvester(dir.path());
        let report = second.run(&identifiers()).await;
        assert_eq!(report.files_downloaded, 0);
        assert_eq!(report.files_skipped, 3);
        assert_eq!(DownloadStore::at(&downloads, DirLayout::Flat).files().unwrap(), after_first);

        let content = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        let summary = reconcile::scan_log(&content);
        assert_eq!(summary.completed, 4);
        // Two runs: NONE, BRKN, and the xyz download failure, twice each.
        assert_eq!(summary.error_lines, 6);
        let tickers: Vec<_> = summary.failing_tickers.iter().map(String::as_str).collect();
        assert_eq!(tickers, vec!["BRKN", "NONE"]);
        assert_eq!(summary.unparseable.len(), 2);

        let jsonl = std::fs::read_to_string(dir.path().join("run.jsonl")).unwrap();
        let from_report = RunReport::from_json_lines(&jsonl).unwrap();
        assert_eq!(from_report.completed, 4);
        assert_eq!(from_report.total(), 8);
    }
}
