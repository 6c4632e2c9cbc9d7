// src/harvest/models.rs
use crate::session::ElementHandle;
use std::path::PathBuf;

/// A ticker paired with the company display name it should resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub ticker: String,
    pub company_name: String,
}

impl Identifier {
    pub fn new(ticker: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            company_name: company_name.into(),
        }
    }
}

/// The search candidate chosen for an identifier. The element that was
/// clicked to reach the company page has already been released.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCompany {
    pub ticker: String,
    pub matched_name: String,
    pub score: f64,
}

/// One downloadable archive entry.
#[derive(Debug)]
pub struct ReportCandidate {
    pub index: usize,
    /// Missing when no heading could be paired with the trigger; only the
    /// filename derivation depends on it.
    pub heading: Option<String>,
    pub trigger: ElementHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub ticker: String,
    pub filename: String,
    pub path: PathBuf,
}

/// `{ticker}_{heading}.pdf`, or `None` when there is no usable heading.
pub fn filename_from_heading(ticker: &str, heading: Option<&str>) -> Option<String> {
    let heading = heading.map(str::trim).filter(|h| !h.is_empty())?;
    Some(format!("{}_{}.pdf", ticker, single_component(heading)))
}

/// `{ticker}_{suggested}`, keeping the driver's suggestion verbatim.
pub fn filename_from_suggestion(ticker: &str, suggested: &str) -> String {
    format!("{}_{}", ticker, single_component(suggested))
}

/// Keep a name inside the download directory.
fn single_component(name: &str) -> String {
    name.replace(['/', '\\'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_filename_is_ticker_prefixed_pdf() {
        assert_eq!(
            filename_from_heading("ABC", Some("2023 Annual Report")).as_deref(),
            Some("ABC_2023 Annual Report.pdf")
        );
        assert_eq!(
            filename_from_heading("ABC", Some("  2023 Annual Report \n")).as_deref(),
            Some("ABC_2023 Annual Report.pdf")
        );
    }

    #[test]
    fn blank_or_missing_heading_has_no_filename() {
        assert_eq!(filename_from_heading("ABC", None), None);
        assert_eq!(filename_from_heading("ABC", Some("   ")), None);
    }

    #[test]
    fn suggestion_is_kept_verbatim() {
        assert_eq!(
            filename_from_suggestion("ABC", "NYSE_ABC_2019.pdf"),
            "ABC_NYSE_ABC_2019.pdf"
        );
    }

    #[test]
    fn separators_do_not_escape_the_directory() {
        assert_eq!(
            filename_from_heading("ABC", Some("2022/2023 ESG Report")).as_deref(),
            Some("ABC_2022-2023 ESG Report.pdf")
        );
    }
}
