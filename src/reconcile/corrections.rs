// src/reconcile/corrections.rs
use std::collections::BTreeSet;
use std::path::Path;

/// Tickers whose downloads, on manual review, belong to the wrong company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionSet {
    tickers: BTreeSet<String>,
}

impl CorrectionSet {
    pub fn from_tickers<I, T>(tickers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut set = Self::default();
        set.extend(tickers);
        set
    }

    /// One or more tickers per line, separated by commas or whitespace.
    /// `#` starts a comment.
    pub fn parse(content: &str) -> Self {
        let tickers = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()));
        Self::from_tickers(tickers)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn extend<I, T>(&mut self, tickers: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.tickers.extend(
            tickers
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty()),
        );
    }

    pub fn tickers(&self) -> &BTreeSet<String> {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}
