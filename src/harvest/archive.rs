// src/harvest/archive.rs
use crate::config::{HarvestConfig, PairingMode};
use crate::harvest::models::ReportCandidate;
use crate::session::{release_all, texts_of, ElementHandle, Session};
use crate::utils::error::SessionError;

/// Make the whole archive visible: wait for the archive block, then press
/// "show older reports" once if the control exists. Returns whether it was
/// pressed. A missing control is normal.
pub async fn expand<S: Session>(session: &mut S, config: &HarvestConfig) -> Result<bool, SessionError> {
    let selectors = &config.selectors;
    session.wait_for(&selectors.archive_block).await?;

    let controls = session.query_all(&selectors.show_older).await?;
    let Some(control) = controls.first() else {
        tracing::debug!("No '{}' control on page", selectors.show_older);
        return Ok(false);
    };

    let clicked = session.click_handle(control).await;
    release_all(session, controls).await;
    clicked?;

    tokio::time::sleep(config.pacing.expand_settle).await;
    Ok(true)
}

/// Collect the archive's report candidates, in page order.
pub async fn extract<S: Session>(
    session: &mut S,
    config: &HarvestConfig,
) -> Result<Vec<ReportCandidate>, SessionError> {
    match config.pairing {
        PairingMode::Rows => extract_rows(session, config).await,
        PairingMode::Offset => extract_offset(session, config).await,
    }
}

/// One structural query per archive row; heading and trigger come from the
/// same row, so they cannot drift apart.
async fn extract_rows<S: Session>(
    session: &mut S,
    config: &HarvestConfig,
) -> Result<Vec<ReportCandidate>, SessionError> {
    let selectors = &config.selectors;
    let rows = session.query_all(&selectors.archive_row).await?;
    let mut candidates = Vec::with_capacity(rows.len());

    let mut failure = None;
    for row in &rows {
        match row_candidate(session, row, config, candidates.len()).await {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    release_all(session, rows).await;

    if let Some(e) = failure {
        let triggers = candidates.into_iter().map(|c| c.trigger).collect();
        release_all(session, triggers).await;
        return Err(e);
    }
    Ok(candidates)
}

async fn row_candidate<S: Session>(
    session: &mut S,
    row: &ElementHandle,
    config: &HarvestConfig,
    index: usize,
) -> Result<Option<ReportCandidate>, SessionError> {
    let selectors = &config.selectors;

    let mut triggers = session.query_within(row, &selectors.download_trigger).await?;
    if triggers.is_empty() {
        tracing::debug!("Archive row without a download trigger skipped");
        return Ok(None);
    }
    let trigger = triggers.remove(0);
    release_all(session, triggers).await;

    let headings = session.query_within(row, &selectors.heading).await?;
    let heading = match headings.first() {
        Some(first) => session.text_content(first).await.map(|t| t.trim().to_string()),
        None => Ok(String::new()),
    };
    release_all(session, headings).await;

    match heading {
        Ok(text) => Ok(Some(ReportCandidate {
            index,
            heading: Some(text).filter(|t| !t.is_empty()),
            trigger,
        })),
        Err(e) => {
            session.release(trigger).await;
            Err(e)
        }
    }
}

/// Legacy pairing from two independent lists: the page carries one leading
/// heading that is not a report, so trigger `i` takes heading `i + 1`.
async fn extract_offset<S: Session>(
    session: &mut S,
    config: &HarvestConfig,
) -> Result<Vec<ReportCandidate>, SessionError> {
    let selectors = &config.selectors;
    let headings = texts_of(session, &selectors.heading).await?;
    let triggers = session.query_all(&selectors.download_trigger).await?;

    if triggers.len() + 1 != headings.len() {
        tracing::warn!(
            "Heading/trigger mismatch: {} headings for {} download links",
            headings.len(),
            triggers.len()
        );
    }

    Ok(triggers
        .into_iter()
        .enumerate()
        .map(|(index, trigger)| ReportCandidate {
            index,
            heading: headings.get(index + 1).cloned().filter(|h| !h.is_empty()),
            trigger,
        })
        .collect())
}
