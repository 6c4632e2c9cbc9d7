// src/harvest/resolver.rs
use crate::config::HarvestConfig;
use crate::harvest::models::{Identifier, ResolvedCompany};
use crate::session::{release_all, texts_of, Session};
use crate::utils::error::{HarvestError, ResolutionFailure, SessionError};

/// Best fuzzy match among search results.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub index: usize,
    pub name: String,
    pub score: f64,
}

/// Lowercase, punctuation to spaces, whitespace collapsed.
pub fn normalise_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rank `candidates` against `target` by Jaro-Winkler similarity of the
/// normalised names. Ties keep the earliest candidate, so the choice is
/// fixed for a fixed result list. `None` when nothing comparable remains.
pub fn best_match(target: &str, candidates: &[String]) -> Option<NameMatch> {
    let target = normalise_name(target);
    if target.is_empty() {
        return None;
    }
    let mut best: Option<NameMatch> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let normalised = normalise_name(candidate);
        if normalised.is_empty() {
            continue;
        }
        let score = strsim::jaro_winkler(&target, &normalised);
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(NameMatch {
                index,
                name: candidate.clone(),
                score,
            });
        }
    }
    best
}

/// Search the site for `identifier.ticker`, pick the result whose name best
/// matches `identifier.company_name`, and open that company's page.
pub async fn resolve<S: Session>(
    session: &mut S,
    config: &HarvestConfig,
    identifier: &Identifier,
) -> Result<ResolvedCompany, HarvestError> {
    let selectors = &config.selectors;

    session.navigate(&config.base_url).await?;
    session.wait_for(&selectors.search_input).await?;
    session.fill(&selectors.search_input, "").await?;
    session.fill(&selectors.search_input, &identifier.ticker).await?;
    session.click(&selectors.search_button).await?;

    // First pass: names only. Handles are gone before matching starts.
    let names = texts_of(session, &selectors.result_names).await?;
    tracing::debug!("Search for {} returned {} candidates: {:?}", identifier.ticker, names.len(), names);

    let found = best_match(&identifier.company_name, &names)
        .ok_or_else(|| failure(identifier, ResolutionFailure::NoMatch))?;

    if found.score < config.match_threshold {
        return Err(failure(
            identifier,
            ResolutionFailure::LowConfidence {
                candidate: found.name,
                score: found.score,
                threshold: config.match_threshold,
            },
        ));
    }

    tracing::info!(
        "Matched {} ({}) to '{}' with score {:.3}",
        identifier.company_name,
        identifier.ticker,
        found.name,
        found.score
    );

    // Second pass: find the live element carrying the matched text.
    click_candidate(session, &selectors.result_names, &found.name).await?;

    Ok(ResolvedCompany {
        ticker: identifier.ticker.clone(),
        matched_name: found.name,
        score: found.score,
    })
}

fn failure(identifier: &Identifier, reason: ResolutionFailure) -> HarvestError {
    HarvestError::Resolution {
        ticker: identifier.ticker.clone(),
        name: identifier.company_name.clone(),
        reason,
    }
}

async fn click_candidate<S: Session>(
    session: &mut S,
    selector: &str,
    name: &str,
) -> Result<(), SessionError> {
    let handles = session.query_all(selector).await?;

    let mut target = None;
    let mut outcome = Ok(());
    for (i, handle) in handles.iter().enumerate() {
        match session.text_content(handle).await {
            Ok(text) if text.trim() == name => {
                target = Some(i);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    if outcome.is_ok() {
        outcome = match target {
            Some(i) => session.click_handle(&handles[i]).await,
            None => Err(SessionError::ElementNotFound(format!(
                "{selector} with text '{name}'"
            ))),
        };
    }

    release_all(session, handles).await;
    outcome
}
