//! Partition catalog scanner
//!
//! Resume state is not checkpointed anywhere: it is recovered by listing the
//! export directory and parsing file names. The same pass removes temp files
//! left behind by a run that crashed mid-publish.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};
use crate::storage::{Storage, path};

use super::naming::{self, PartitionNaming};
use super::window::PartitionWindow;

/// Outcome of scanning one series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Resume point: the latest finalized window end, or the epoch
    pub watermark: DateTime<Utc>,
    /// Finalized windows of the series, ascending
    pub finalized: Vec<PartitionWindow>,
    /// Temp files removed by the sweep
    pub swept: Vec<String>,
    /// Entries that belong to no partition of this series
    pub skipped: usize,
}

impl ScanReport {
    /// Whether a finalized file already covers `window`
    pub fn has(&self, window: &PartitionWindow) -> bool {
        self.finalized.binary_search(window).is_ok()
    }
}

/// Scans an export directory for one series at a time
pub struct CatalogScanner<'a> {
    storage: &'a Storage,
}

impl<'a> CatalogScanner<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// List `dir` once, sweep temp files and compute the watermark
    ///
    /// # Arguments
    /// * `dir` - Export directory
    /// * `naming` - Naming grammar of the series being evaluated
    /// * `epoch` - Watermark when no finalized file exists
    ///
    /// # Returns
    /// * `Result<ScanReport>` - Watermark and sweep results; a listing failure
    ///   is an error, a failed temp removal is only logged
    pub async fn scan(
        &self,
        dir: &str,
        naming: &PartitionNaming,
        epoch: DateTime<Utc>,
    ) -> Result<ScanReport> {
        let entries = match self.storage.list(dir).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound(_)) => {
                debug!(path = %dir, "Export directory does not exist yet");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut finalized = Vec::new();
        let mut swept = Vec::new();
        let mut skipped = 0;

        for entry in entries {
            if entry.is_dir {
                skipped += 1;
                continue;
            }

            if naming::is_temp_name(&entry.name) {
                let temp_path = path::join(&[dir, entry.name.as_str()]);
                match self.storage.remove(&temp_path).await {
                    Ok(()) => {
                        info!(path = %temp_path, "Removed orphaned temporary file");
                        swept.push(temp_path);
                    }
                    Err(e) => warn!(path = %temp_path, "Failed to remove orphaned temporary file: {}", e),
                }
                continue;
            }

            match naming.parse(&entry.name) {
                Some(window) => finalized.push(window),
                None => {
                    debug!(path = %dir, "Skipping unrelated file {}", entry.name);
                    skipped += 1;
                }
            }
        }

        finalized.sort();
        finalized.dedup();

        // Gaps below the latest window are not backfilled
        let watermark = finalized.iter().map(|w| w.end).max().unwrap_or(epoch);

        Ok(ScanReport {
            watermark,
            finalized,
            swept,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::SeriesDefinition;
    use crate::export::format::{Compression, FileFormat, RowFormat};
    use crate::export::window::{Granularity, epoch_start};
    use crate::storage::MemoryStorage;
    use chrono::{NaiveDate, TimeZone};

    fn naming(granularity: Granularity) -> PartitionNaming {
        let series = SeriesDefinition::new("fingerprint", "SELECT 1", granularity, true);
        PartitionNaming::new(&series, FileFormat::new(RowFormat::Csv, Compression::Gzip))
    }

    fn epoch() -> DateTime<Utc> {
        epoch_start(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap())
    }

    #[tokio::test]
    async fn test_watermark_ignores_gaps() {
        let memory = MemoryStorage::new();
        memory.put("out/fingerprint.delta.2021-01.csv.gz", b"x");
        memory.put("out/fingerprint.delta.2021-03.csv.gz", b"x");
        let storage = Storage::from(memory);

        let report = CatalogScanner::new(&storage)
            .scan("out", &naming(Granularity::Month), epoch())
            .await
            .unwrap();

        assert_eq!(report.watermark, Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap());
        assert_eq!(report.finalized.len(), 2);
        assert!(report.swept.is_empty());
    }

    #[tokio::test]
    async fn test_empty_directory_uses_epoch() {
        let memory = MemoryStorage::new();
        memory.mkdir_all("out").unwrap();
        let storage = Storage::from(memory);

        let report = CatalogScanner::new(&storage)
            .scan("out", &naming(Granularity::Day), epoch())
            .await
            .unwrap();
        assert_eq!(report.watermark, epoch());
        assert!(report.finalized.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_uses_epoch() {
        let storage = Storage::from(MemoryStorage::new());
        let report = CatalogScanner::new(&storage)
            .scan("nowhere", &naming(Granularity::Day), epoch())
            .await
            .unwrap();
        assert_eq!(report.watermark, epoch());
    }

    #[tokio::test]
    async fn test_sweeps_temp_files_of_any_age() {
        let memory = MemoryStorage::new();
        memory.put("out/fingerprint.delta.2021-01.csv.gz", b"x");
        memory.put("out/.fingerprint.delta.2021-02.csv.gz.0f3c.tmp", b"partial");
        memory.put("out/.sessions.full.2021-02-01.jsonl.gz.77aa.tmp", b"partial");
        let storage = Storage::from(memory.clone());

        let report = CatalogScanner::new(&storage)
            .scan("out", &naming(Granularity::Month), epoch())
            .await
            .unwrap();

        assert_eq!(report.swept.len(), 2);
        assert_eq!(memory.files(), vec!["out/fingerprint.delta.2021-01.csv.gz".to_string()]);
        assert_eq!(report.watermark, Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_skips_unrelated_entries() {
        let memory = MemoryStorage::new();
        memory.put("out/fingerprint.delta.2021-01.csv.gz", b"x");
        memory.put("out/fingerprint.delta.2021-05.jsonl.gz", b"other format");
        memory.put("out/fingerprint.full.2021-06.csv.gz", b"other token");
        memory.put("out/sessions.delta.2021-07.csv.gz", b"other series");
        memory.put("out/fingerprint.delta.2021-13.csv.gz", b"bad month");
        memory.put("out/README", b"notes");
        memory.put("out/archive/fingerprint.delta.2022-01.csv.gz", b"nested");
        let storage = Storage::from(memory);

        let report = CatalogScanner::new(&storage)
            .scan("out", &naming(Granularity::Month), epoch())
            .await
            .unwrap();

        assert_eq!(report.finalized.len(), 1);
        assert_eq!(report.skipped, 6);
        assert_eq!(report.watermark, Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_day_granularity_watermark() {
        let memory = MemoryStorage::new();
        memory.put("fingerprint.delta.2021-02-27.csv.gz", b"x");
        memory.put("fingerprint.delta.2021-02-28.csv.gz", b"x");
        let storage = Storage::from(memory);

        let report = CatalogScanner::new(&storage)
            .scan("", &naming(Granularity::Day), epoch())
            .await
            .unwrap();
        assert_eq!(report.watermark, Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap());
        assert!(report.has(&report.finalized[0]));
    }
}
