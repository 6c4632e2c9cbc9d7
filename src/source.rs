// src/source.rs
use crate::harvest::Identifier;
use crate::utils::AppError;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "Symbol", alias = "Ticker")]
    symbol: String,
    #[serde(rename = "Shortname", alias = "Name", default)]
    name: String,
}

/// Read `(ticker, company name)` pairs from a CSV file, keeping file order.
pub fn read_identifiers(path: &Path) -> Result<Vec<Identifier>, AppError> {
    let file = std::fs::File::open(path)
        .map_err(|e| AppError::Config(format!("cannot open {}: {}", path.display(), e)))?;
    read_identifiers_from(file)
}

pub fn read_identifiers_from<R: Read>(reader: R) -> Result<Vec<Identifier>, AppError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut identifiers = Vec::new();
    for (line, row) in csv.deserialize::<Row>().enumerate() {
        let row = row?;
        if row.symbol.is_empty() {
            tracing::warn!("Skipping row {} without a ticker", line + 2);
            continue;
        }
        if row.name.is_empty() {
            tracing::warn!("Ticker {} has no company name; matching will fail", row.symbol);
        }
        identifiers.push(Identifier::new(row.symbol, row.name));
    }
    Ok(identifiers)
}
