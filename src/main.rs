// src/main.rs
mod cli;
mod config;
mod harvest;
mod reconcile;
mod runlog;
mod session;
mod source;
mod storage;
mod utils;

#[cfg(test)]
mod testing;

use clap::Parser;
use cli::{Cli, Command, HarvestArgs, ReconcileArgs};
use harvest::Harvester;
use reconcile::{CorrectionSet, ReconcileOptions};
use runlog::{RunEvent, RunLog};
use session::http::{HttpSession, ReqwestTransport};
use storage::DownloadStore;
use utils::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging("info");

    // 2. Parse CLI Arguments
    let cli = Cli::parse();
    tracing::debug!("Starting with args: {:?}", cli);

    match cli.command {
        Command::Harvest(args) => run_harvest(args).await,
        Command::Reconcile(args) => run_reconcile(args),
    }
}

async fn run_harvest(args: HarvestArgs) -> Result<(), AppError> {
    let config = args.config();
    config.validate().map_err(AppError::Config)?;
    tracing::debug!("Effective configuration: {:?}", config);

    let mut log = RunLog::open(&args.log)?.with_report(&args.report)?;

    // Anything failing before the per-identifier loop aborts the batch.
    let prepared = prepare(&args, &config, &mut log);
    let (identifiers, store) = match prepared {
        Ok(ready) => ready,
        Err(e) => {
            log.event(&RunEvent::Fatal { error: &e });
            return Err(e);
        }
    };

    let transport = ReqwestTransport::new()?;
    let session = HttpSession::new(transport);
    log.event(&RunEvent::SessionStarted);

    let mut harvester = Harvester::new(session, store.clone(), log, config);
    let report = harvester.run(&identifiers).await;

    tracing::info!(
        "Processing finished for {} identifiers. Completed: {}, No match: {}, Low confidence: {}, Failed: {}",
        report.total(),
        report.completed,
        report.no_match,
        report.low_confidence,
        report.failed
    );
    tracing::info!(
        "Files downloaded: {}, skipped: {}, failed: {}",
        report.files_downloaded,
        report.files_skipped,
        report.files_failed
    );
    if !report.attention.is_empty() {
        tracing::warn!("Tickers needing review: {}", report.attention.join(", "));
    }

    let leaked = harvester.session().live_handles();
    if leaked > 0 {
        tracing::warn!("{} element handles were never released", leaked);
    }

    match store.count() {
        Ok(count) => harvester.log().event(&RunEvent::FileCount { count }),
        Err(e) => tracing::warn!("Could not count downloads: {}", e),
    }
    Ok(())
}

fn prepare(
    args: &HarvestArgs,
    config: &config::HarvestConfig,
    log: &mut RunLog,
) -> Result<(Vec<harvest::Identifier>, DownloadStore), AppError> {
    let mut identifiers = source::read_identifiers(&args.input)?;
    if !args.only.is_empty() {
        identifiers.retain(|id| args.only.iter().any(|t| t.eq_ignore_ascii_case(&id.ticker)));
    }
    log.event(&RunEvent::IdentifiersLoaded { count: identifiers.len() });

    let store = DownloadStore::create(&args.download_dir, config.layout)?;
    log.event(&RunEvent::DirectoryReady { path: store.base_dir() });
    Ok((identifiers, store))
}

fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let mut corrections = match &args.corrections_file {
        Some(path) => CorrectionSet::load(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?,
        None => CorrectionSet::default(),
    };
    corrections.extend(&args.correct);

    let options = ReconcileOptions {
        download_dir: args.download_dir,
        layout: args.layout,
        log_path: args.log,
        report_path: args.report,
        corrections,
    };
    let result = reconcile::reconcile(&options)?;

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| AppError::Processing(format!("cannot serialise summary: {e}")))?;
        println!("{json}");
    } else {
        print!("{result}");
    }
    Ok(())
}
