//! On-disk layout of the produced artifacts.
//!
//! Every artifact lives under a single data root, in the directory
//! structure the downstream backtesting engine reads:
//!
//! ```text
//! equity/usa/factor_files/{ticker}.csv
//! equity/usa/map_files/{ticker}.csv
//! equity/usa/fundamental/coarse/{YYYYMMDD}.csv
//! equity/usa/fundamental/fine/polygon/{ticker}.json
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use refdata_core::Result;

/// Resolves artifact paths under one data root.
#[derive(Clone, Debug)]
pub(crate) struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn factor_file(&self, ticker: &str) -> PathBuf {
        self.root
            .join("equity/usa/factor_files")
            .join(format!("{}.csv", ticker.to_lowercase()))
    }

    pub fn map_file(&self, ticker: &str) -> PathBuf {
        self.root
            .join("equity/usa/map_files")
            .join(format!("{}.csv", ticker.to_lowercase()))
    }

    pub fn coarse_file(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join("equity/usa/fundamental/coarse")
            .join(format!("{}.csv", date.format("%Y%m%d")))
    }

    pub fn fine_file(&self, ticker: &str) -> PathBuf {
        self.root
            .join("equity/usa/fundamental/fine/polygon")
            .join(format!("{}.json", ticker.to_lowercase()))
    }
}

/// Writes a file atomically: the contents land in a temp file in the target
/// directory, then replace the destination with a rename. Readers never
/// observe a partial write.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_lowercase_under_root() {
        let layout = DataLayout::new("/data");
        assert_eq!(
            layout.factor_file("AAPL"),
            PathBuf::from("/data/equity/usa/factor_files/aapl.csv")
        );
        assert_eq!(
            layout.map_file("AAPL"),
            PathBuf::from("/data/equity/usa/map_files/aapl.csv")
        );
        assert_eq!(
            layout.coarse_file(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            PathBuf::from("/data/equity/usa/fundamental/coarse/20240301.csv")
        );
        assert_eq!(
            layout.fine_file("AAPL"),
            PathBuf::from("/data/equity/usa/fundamental/fine/polygon/aapl.json")
        );
    }

    #[tokio::test]
    async fn write_atomic_creates_directories_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/file.csv");

        write_atomic(&path, "one\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\n");

        write_atomic(&path, "two\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\n");

        // No temp file left behind.
        assert!(!path.with_extension("tmp").exists());
    }
}
