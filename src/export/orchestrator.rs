//! Export orchestrator
//!
//! Runs every registered series in registration order, one after the other:
//! ensure the export directory, scan, sequence, dump. The first failing
//! series ends the run. There is no commit step: whatever was published is
//! visible to the next scan.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ExportConfig;
use crate::database::ExportSource;
use crate::error::{ExportError, Result};
use crate::storage::{Storage, path};

use super::SeriesDefinition;
use super::format::FileFormat;
use super::naming::PartitionNaming;
use super::pipeline::{DumpPipeline, PipelineOptions};
use super::query::{QueryRenderer, format_timestamp};
use super::scanner::{CatalogScanner, ScanReport};
use super::sequencer::{PartitionSequencer, WindowSink};
use super::window::{PartitionWindow, epoch_start};

/// A partition published by this run
#[derive(Debug, Clone, Serialize)]
pub struct PublishedFile {
    pub path: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Compressed size
    pub bytes: u64,
}

/// Outcome for one series
#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub series: String,
    /// Resume point after this run
    pub watermark: DateTime<Utc>,
    pub published: Vec<PublishedFile>,
    /// Orphaned temp files removed before exporting
    pub swept: Vec<String>,
    /// Planned windows whose file already existed
    pub already_present: usize,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub series: Vec<SeriesReport>,
}

impl RunSummary {
    /// Number of files published across all series
    pub fn files_published(&self) -> usize {
        self.series.iter().map(|s| s.published.len()).sum()
    }

    /// Compressed bytes published across all series
    pub fn bytes_published(&self) -> u64 {
        self.series
            .iter()
            .flat_map(|s| s.published.iter())
            .map(|f| f.bytes)
            .sum()
    }
}

/// Runs the incremental export over a storage and a database source
pub struct Exporter<'a> {
    storage: &'a Storage,
    source: &'a dyn ExportSource,
    renderer: QueryRenderer,
    directory: String,
    epoch: DateTime<Utc>,
    max_windows: Option<usize>,
    options: PipelineOptions,
    cancel_token: CancellationToken,
}

impl<'a> Exporter<'a> {
    /// Create an exporter from the `[export]` configuration
    ///
    /// # Arguments
    /// * `storage` - Connected storage backend
    /// * `source` - Connected database source
    /// * `config` - Export settings
    pub fn new(storage: &'a Storage, source: &'a dyn ExportSource, config: &ExportConfig) -> Self {
        Self {
            storage,
            source,
            renderer: QueryRenderer::new(),
            directory: path::normalize(&config.directory).to_string(),
            epoch: epoch_start(config.epoch),
            max_windows: config.max_windows_per_series,
            options: PipelineOptions {
                format: FileFormat::new(config.format, config.compression),
                channel_capacity: config.channel_capacity,
                buffer_size: config.buffer_size,
            },
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set cancellation token for the run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Export all series up to the current time
    pub async fn run(&self, series: &[SeriesDefinition]) -> Result<RunSummary> {
        self.run_at(series, Utc::now()).await
    }

    /// Export all series up to `now`
    ///
    /// # Returns
    /// * `Result<RunSummary>` - Per-series reports, or the first error
    pub async fn run_at(&self, series: &[SeriesDefinition], now: DateTime<Utc>) -> Result<RunSummary> {
        info!(
            "Exporting {} series into {} as {} (now: {})",
            series.len(),
            self.storage.describe(),
            self.options.format,
            format_timestamp(now)
        );

        let mut summary = RunSummary::default();
        for definition in series {
            if self.cancel_token.is_cancelled() {
                info!("Export cancelled before series {}", definition.name);
                return Err(ExportError::Cancelled);
            }

            let report = self.export_series(definition, now).await.map_err(|e| {
                error!(series = %definition.name, "Series export failed: {}", e);
                e
            })?;

            info!(
                series = %definition.name,
                "{} files published, watermark {}",
                report.published.len(),
                format_timestamp(report.watermark)
            );
            summary.series.push(report);
        }

        info!(
            "Export completed: {} files, {} bytes",
            summary.files_published(),
            summary.bytes_published()
        );
        Ok(summary)
    }

    async fn export_series(
        &self,
        definition: &SeriesDefinition,
        now: DateTime<Utc>,
    ) -> Result<SeriesReport> {
        self.storage
            .ensure_dir(&self.directory)
            .await
            .map_err(|e| {
                error!(series = %definition.name, path = %self.directory, "Cannot prepare export directory: {}", e);
                e
            })?;

        let naming = PartitionNaming::new(definition, self.options.format);
        let scan = CatalogScanner::new(self.storage)
            .scan(&self.directory, &naming, self.epoch)
            .await?;
        debug!(
            series = %definition.name,
            "Found {} partitions, {} unrelated entries, watermark {}",
            scan.finalized.len(),
            scan.skipped,
            format_timestamp(scan.watermark)
        );

        let sequencer =
            PartitionSequencer::new(definition.granularity, definition.incremental)
                .with_limit(self.max_windows);
        let windows = sequencer.windows(scan.watermark, now);
        if windows.is_empty() {
            debug!(series = %definition.name, "Up to date");
        }

        let mut sink = SeriesSink {
            exporter: self,
            definition,
            naming,
            listed: &scan,
            published: Vec::new(),
            already_present: 0,
        };
        sequencer.run(&windows, &mut sink).await?;
        let SeriesSink {
            published,
            already_present,
            ..
        } = sink;

        let watermark = published
            .iter()
            .map(|f| f.window_end)
            .fold(scan.watermark, |acc, end| acc.max(end));

        Ok(SeriesReport {
            series: definition.name.clone(),
            watermark,
            published,
            swept: scan.swept,
            already_present,
        })
    }
}

/// Sink publishing each window of one series through the dump pipeline
struct SeriesSink<'e, 'a> {
    exporter: &'e Exporter<'a>,
    definition: &'e SeriesDefinition,
    naming: PartitionNaming,
    /// Listing taken by the scanner at the start of the series
    listed: &'e ScanReport,
    published: Vec<PublishedFile>,
    already_present: usize,
}

#[async_trait]
impl<'e, 'a> WindowSink for SeriesSink<'e, 'a> {
    async fn export_window(&mut self, window: &PartitionWindow) -> Result<()> {
        let exporter = self.exporter;
        if exporter.cancel_token.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let series = &self.definition.name;
        let file_name = self.naming.file_name(window);
        let final_path = path::join(&[exporter.directory.as_str(), file_name.as_str()]);

        // Never overwrite a published partition
        if self.listed.has(window) || exporter.storage.exists(&final_path).await? {
            debug!(series = %series, window = %window, path = %final_path, "Already published");
            self.already_present += 1;
            return Ok(());
        }

        info!(series = %series, window = %window, path = %final_path, "Exporting window");
        let result = DumpPipeline::new(
            exporter.storage,
            exporter.source,
            &exporter.renderer,
            exporter.options,
        )
        .with_cancellation(exporter.cancel_token.child_token())
        .dump(&self.definition.query_template, window, &final_path)
        .await
        .map_err(|e| {
            error!(series = %series, window = %window, path = %final_path, "Window export failed: {}", e);
            e
        })?;

        self.published.push(PublishedFile {
            path: result.path,
            window_start: window.start,
            window_end: window.end,
            bytes: result.bytes_written,
        });
        Ok(())
    }
}
