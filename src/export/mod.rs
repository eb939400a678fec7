//! Incremental export engine
//!
//! A run walks every registered series in order. For each one the scanner
//! recovers the resume point from the files already published, the sequencer
//! enumerates the windows between that point and now, and the dump pipeline
//! streams each window's rows into a compressed file that is published with a
//! single rename.

pub mod format;
pub mod naming;
pub mod orchestrator;
pub mod pipeline;
pub mod query;
pub mod scanner;
pub mod sequencer;
pub mod window;

pub use format::{Compression, FileFormat, RowFormat};
pub use naming::PartitionNaming;
pub use orchestrator::{Exporter, RunSummary, SeriesReport};
pub use pipeline::{DumpPipeline, DumpResult, PipelineOptions};
pub use query::QueryRenderer;
pub use scanner::{CatalogScanner, ScanReport};
pub use sequencer::{PartitionSequencer, WindowSink};
pub use window::{Granularity, PartitionWindow};

/// One registered export target, immutable for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDefinition {
    /// Series name, the first field of every file name
    pub name: String,
    /// Extraction query template
    pub query_template: String,
    pub granularity: Granularity,
    /// `false` for full-snapshot series
    pub incremental: bool,
}

impl SeriesDefinition {
    pub fn new(
        name: impl Into<String>,
        query_template: impl Into<String>,
        granularity: Granularity,
        incremental: bool,
    ) -> Self {
        Self {
            name: name.into(),
            query_template: query_template.into(),
            granularity,
            incremental,
        }
    }
}
