// src/harvest/download.rs
use crate::config::HarvestConfig;
use crate::harvest::models::{filename_from_heading, filename_from_suggestion, DownloadedFile, ReportCandidate};
use crate::runlog::{RunEvent, RunLog};
use crate::session::{Download, ElementHandle, Session};
use crate::utils::error::SessionError;
use crate::storage::DownloadStore;
use crate::utils::error::HarvestError;

#[derive(Debug)]
enum CandidateOutcome {
    Saved(DownloadedFile),
    /// The derived file is already on disk.
    Skipped(String),
}

/// Per-identifier download counts.
#[derive(Debug, Default)]
pub struct DownloadTally {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<DownloadedFile>,
}

/// Download every candidate in order. A failing candidate is logged and the
/// next one is attempted; each trigger handle is released after its turn.
/// The pacing delay follows every candidate that reached the site, failures
/// included; a dedup skip makes no request and moves on at once.
pub async fn download_all<S: Session>(
    session: &mut S,
    store: &DownloadStore,
    log: &mut RunLog,
    config: &HarvestConfig,
    ticker: &str,
    candidates: Vec<ReportCandidate>,
) -> DownloadTally {
    let mut tally = DownloadTally::default();

    for candidate in candidates {
        let ReportCandidate { index, heading, trigger } = candidate;
        tracing::debug!("Candidate {} for {}: heading {:?}", index, ticker, heading);

        let result = download_one(session, store, config, ticker, heading.as_deref(), &trigger).await;
        session.release(trigger).await;

        match result {
            Ok(CandidateOutcome::Skipped(filename)) => {
                log.event(&RunEvent::FileExists { filename: &filename });
                tally.skipped += 1;
                continue;
            }
            Ok(CandidateOutcome::Saved(file)) => {
                log.event(&RunEvent::Downloaded { filename: &file.filename, ticker: &file.ticker });
                tracing::debug!("Saved to {}", file.path.display());
                tally.downloaded += 1;
                tally.files.push(file);
            }
            Err(e) => {
                log.event(&RunEvent::DownloadError { ticker, error: &e });
                tally.failed += 1;
            }
        }

        tokio::time::sleep(config.pacing.between_candidates).await;
    }

    tally
}

async fn download_one<S: Session>(
    session: &mut S,
    store: &DownloadStore,
    config: &HarvestConfig,
    ticker: &str,
    heading: Option<&str>,
    trigger: &ElementHandle,
) -> Result<CandidateOutcome, HarvestError> {
    let derived = filename_from_heading(ticker, heading);
    if let Some(filename) = &derived {
        if store.contains(ticker, filename) {
            return Ok(CandidateOutcome::Skipped(filename.clone()));
        }
    }

    let timeout = config.pacing.download_timeout;
    let download = tokio::time::timeout(timeout, start_download(session, trigger))
        .await
        .map_err(|_| HarvestError::Download(format!("no download started within {timeout:?}")))?
        .map_err(|e| HarvestError::Download(e.to_string()))?;

    let filename = match derived {
        Some(filename) => filename,
        None => {
            let filename = filename_from_suggestion(ticker, download.suggested_filename());
            // Fallback names can only be checked once the driver has named the file.
            if store.contains(ticker, &filename) {
                return Ok(CandidateOutcome::Skipped(filename));
            }
            filename
        }
    };

    let path = store.path_for(ticker, &filename);
    download
        .save_as(&path)
        .await
        .map_err(|e| HarvestError::Download(format!("saving {}: {}", path.display(), e)))?;

    Ok(CandidateOutcome::Saved(DownloadedFile {
        ticker: ticker.to_string(),
        filename,
        path,
    }))
}

/// Arm, trigger and wait for the download; the whole exchange is what the
/// download timeout bounds.
async fn start_download<S: Session>(
    session: &mut S,
    trigger: &ElementHandle,
) -> Result<S::Download, SessionError> {
    session.arm_download();
    session.click_handle(trigger).await?;
    session.await_download().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirLayout, HarvestConfig, Pacing, PairingMode};
    use crate::harvest::archive;
    use crate::session::http::HttpSession;
    use crate::testing::{SiteBuilder, StaticSite, SITE};
    use std::time::Duration;

    fn config() -> HarvestConfig {
        HarvestConfig {
            base_url: format!("{SITE}/"),
            pacing: Pacing::immediate(),
            pairing: PairingMode::Rows,
            ..HarvestConfig::default()
        }
    }

    async fn run_once(
        session: &mut HttpSession<StaticSite>,
        store: &DownloadStore,
        log: &mut RunLog,
        slug: &str,
    ) -> DownloadTally {
        session.navigate(&format!("{SITE}/Company/{slug}")).await.unwrap();
        let candidates = archive::extract(session, &config()).await.unwrap();
        download_all(session, store, log, &config(), "ABC", candidates).await
    }

    #[tokio::test]
    async fn second_pass_writes_nothing() {
        let site = SiteBuilder::new()
            .company("abc", &[("2023 Annual Report", "a.pdf"), ("2022 Annual Report", "b.pdf")], false)
            .report("a.pdf", b"a")
            .report("b.pdf", b"b")
            .build();
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::create(dir.path().join("downloads"), DirLayout::Flat).unwrap();
        let mut log = RunLog::open(dir.path().join("run.log")).unwrap();
        let mut session = HttpSession::new(site);

        let first = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(first.downloaded, 2);
        assert_eq!(first.files[0].filename, "ABC_2023 Annual Report.pdf");
        let after_first = store.files().unwrap();

        let second = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.files().unwrap(), after_first);
        // Skips never touch the network.
        assert_eq!(session.transport().hits("/files/"), 2);
        assert_eq!(session.live_handles(), 0);

        let log_text = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert_eq!(log_text.matches("File already exists: ABC_2023 Annual Report.pdf").count(), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let site = SiteBuilder::new()
            .company(
                "abc",
                &[("2023 Report", "missing.pdf"), ("2022 Report", "b.pdf"), ("2021 Report", "c.pdf")],
                false,
            )
            .report("b.pdf", b"b")
            .report("c.pdf", b"c")
            .build();
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::create(dir.path(), DirLayout::Ticker).unwrap();
        let mut log = RunLog::open(dir.path().join("run.log")).unwrap();
        let mut session = HttpSession::new(site);

        let tally = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.downloaded, 2);
        assert!(dir.path().join("ABC").join("ABC_2022 Report.pdf").exists());
        assert!(dir.path().join("ABC").join("ABC_2021 Report.pdf").exists());

        let log_text = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(log_text.contains("Error downloading report for ABC:"));
    }

    #[tokio::test]
    async fn trigger_answering_with_a_page_does_not_stale_the_rest() {
        let site = SiteBuilder::new()
            .company(
                "abc",
                &[("2023 Report", "viewer"), ("2022 Report", "b.pdf"), ("2021 Report", "c.pdf")],
                false,
            )
            .raw_page("/files/viewer", "<html><body>inline viewer</body></html>")
            .report("b.pdf", b"b")
            .report("c.pdf", b"c")
            .build();
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::create(dir.path().join("d"), DirLayout::Flat).unwrap();
        let mut log = RunLog::open(dir.path().join("run.log")).unwrap();
        let mut session = HttpSession::new(site);

        let tally = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.downloaded, 2);
        assert_eq!(session.live_handles(), 0);

        let log_text = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(log_text.contains("Error downloading report for ABC: Download failed: No download started"));
        assert!(!log_text.contains("Navigation failed"));
        assert!(!log_text.contains("no longer attached"));
    }

    #[tokio::test]
    async fn download_timeout_covers_the_trigger_request() {
        let site = SiteBuilder::new()
            .company("abc", &[("2023 Report", "slow.pdf"), ("2022 Report", "b.pdf")], false)
            .report("slow.pdf", b"late")
            .report("b.pdf", b"b")
            .slow("slow.pdf", Duration::from_secs(30))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::create(dir.path().join("d"), DirLayout::Flat).unwrap();
        let mut log = RunLog::open(dir.path().join("run.log")).unwrap();
        let mut session = HttpSession::new(site);
        let mut config = config();
        config.pacing.download_timeout = Duration::from_millis(100);

        session.navigate(&format!("{SITE}/Company/abc")).await.unwrap();
        let candidates = archive::extract(&mut session, &config).await.unwrap();
        let tally = download_all(&mut session, &store, &mut log, &config, "ABC", candidates).await;

        assert_eq!(tally.failed, 1);
        assert_eq!(tally.downloaded, 1);
        assert_eq!(tally.files[0].filename, "ABC_2022 Report.pdf");
        let log_text = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(log_text.contains("no download started within"));
    }

    #[tokio::test]
    async fn missing_heading_falls_back_to_suggested_name() {
        let html = r#"<div class="archived_report_block"><div class="archived_report_content_block"><ul>
            <li><span class="btn_archived download"><a href="/files/x">d</a></span></li>
        </ul></div></div>"#;
        let site = SiteBuilder::new()
            .raw_page("/Company/abc", html)
            .attachment("x", "NYSE_ABC_2019.pdf", b"x")
            .build();
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::create(dir.path().join("d"), DirLayout::Flat).unwrap();
        let mut log = RunLog::open(dir.path().join("run.log")).unwrap();
        let mut session = HttpSession::new(site);

        let tally = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(tally.downloaded, 1);
        assert_eq!(tally.files[0].filename, "ABC_NYSE_ABC_2019.pdf");

        // The fallback name is deduplicated too, after the driver names it.
        let again = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(again.downloaded, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn trigger_without_download_is_a_failure() {
        let html = r#"<div class="archived_report_block"><div class="archived_report_content_block"><ul>
            <li><span class="heading">2023</span><span class="btn_archived download"><a href="/Company/abc">d</a></span></li>
        </ul></div></div>"#;
        let site = SiteBuilder::new().raw_page("/Company/abc", html).build();
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::create(dir.path().join("d"), DirLayout::Flat).unwrap();
        let mut log = RunLog::open(dir.path().join("run.log")).unwrap();
        let mut session = HttpSession::new(site);

        let tally = run_once(&mut session, &store, &mut log, "abc").await;
        assert_eq!(tally.failed, 1);
        assert_eq!(store.count().unwrap(), 0);
    }
}
