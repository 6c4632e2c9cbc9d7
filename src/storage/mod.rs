// src/storage/mod.rs
use crate::config::DirLayout;
use crate::utils::error::StorageError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Separator between the ticker prefix and the rest of a stored filename.
pub const TICKER_SEPARATOR: char = '_';

/// The download directory. A file's presence at its derived path is the
/// dedup key shared with every later run.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    base_dir: PathBuf,
    layout: DirLayout,
}

impl DownloadStore {
    /// Opens the store for writing, creating the base directory if needed.
    pub fn create<P: AsRef<Path>>(base_dir: P, layout: DirLayout) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
            tracing::info!("Created download directory {}", base_path.display());
        }

        Ok(Self { base_dir: base_path, layout })
    }

    /// Refers to the store without touching the filesystem.
    pub fn at<P: AsRef<Path>>(base_dir: P, layout: DirLayout) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            layout,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Deterministic location of `filename` for `ticker`.
    pub fn path_for(&self, ticker: &str, filename: &str) -> PathBuf {
        match self.layout {
            DirLayout::Flat => self.base_dir.join(filename),
            DirLayout::Ticker => self.base_dir.join(ticker).join(filename),
        }
    }

    pub fn contains(&self, ticker: &str, filename: &str) -> bool {
        self.path_for(ticker, filename).exists()
    }

    /// Every stored file, flat entries and one level of ticker directories.
    /// In-flight `.part` files are not counted.
    pub fn files(&self) -> Result<Vec<PathBuf>, StorageError> {
        if !self.base_dir.is_dir() {
            return Err(StorageError::MissingDirectory(self.base_dir.clone()));
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                for nested in fs::read_dir(&path)? {
                    let nested = nested?.path();
                    if nested.is_file() && !is_partial(&nested) {
                        files.push(nested);
                    }
                }
            } else if !is_partial(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        Ok(self.files()?.len())
    }

    /// Delete every file whose ticker prefix is in `tickers`. Returns how many
    /// were removed; files that are already gone are not an error.
    pub fn remove_tickers(&self, tickers: &BTreeSet<String>) -> Result<usize, StorageError> {
        let mut removed = 0;
        for path in self.files()? {
            let Some(prefix) = path.file_name().and_then(|n| n.to_str()).map(ticker_prefix) else {
                continue;
            };
            if !tickers.contains(prefix) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("Removed {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::IoError(e)),
            }
        }
        Ok(removed)
    }
}

/// Text before the first separator.
pub fn ticker_prefix(filename: &str) -> &str {
    filename
        .split(TICKER_SEPARATOR)
        .next()
        .unwrap_or(filename)
}

fn is_partial(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "part")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn set(tickers: &[&str]) -> BTreeSet<String> {
        tickers.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn paths_follow_layout() {
        let flat = DownloadStore::at("/data/downloads", DirLayout::Flat);
        assert_eq!(
            flat.path_for("ABC", "ABC_2023 Annual Report.pdf"),
            PathBuf::from("/data/downloads/ABC_2023 Annual Report.pdf")
        );
        let scoped = DownloadStore::at("/data/downloads", DirLayout::Ticker);
        assert_eq!(
            scoped.path_for("ABC", "ABC_2023 Annual Report.pdf"),
            PathBuf::from("/data/downloads/ABC/ABC_2023 Annual Report.pdf")
        );
    }

    #[test]
    fn prefix_is_text_before_first_separator() {
        assert_eq!(ticker_prefix("BRK-B_2021 Report.pdf"), "BRK-B");
        assert_eq!(ticker_prefix("K_NYSE_K_2020.pdf"), "K");
        assert_eq!(ticker_prefix("README"), "README");
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = DownloadStore::at(dir.path().join("absent"), DirLayout::Flat);
        assert!(matches!(store.count(), Err(StorageError::MissingDirectory(_))));
    }

    #[test]
    fn counts_both_layouts_and_ignores_partials() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("A_1.pdf"));
        touch(&dir.path().join("B").join("B_1.pdf"));
        touch(&dir.path().join("C_1.pdf.part"));
        let store = DownloadStore::create(dir.path(), DirLayout::Flat).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn removal_matches_exact_prefix_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["K_2023.pdf", "KO_2023.pdf", "KEY_2022.pdf", "O_2021.pdf", "ON_2021.pdf"] {
            touch(&dir.path().join(name));
        }
        let store = DownloadStore::create(dir.path(), DirLayout::Flat).unwrap();
        let corrections = set(&["K", "O"]);

        assert_eq!(store.remove_tickers(&corrections).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 3);

        assert_eq!(store.remove_tickers(&corrections).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 3);
        assert!(dir.path().join("KO_2023.pdf").exists());
        assert!(dir.path().join("ON_2021.pdf").exists());
    }
}
