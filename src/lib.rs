//! Partition Export Library
//!
//! Incremental, crash-safe export of time-partitioned database data into
//! compressed, immutable files. Each run exports every complete window that
//! is not yet present in the target directory and resumes from the files
//! already published, so it can simply be re-run after any failure.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `database`: Database collaborator (PostgreSQL `COPY` streaming)
//! - `error`: Error types and handling
//! - `export`: Windows, naming, scanning, sequencing and the dump pipeline
//! - `storage`: Storage backends
//!
//! # Example
//!
//! ```no_run
//! use partition_export::{Config, Exporter, PostgresSource, Storage};
//!
//! #[tokio::main]
//! async fn main() -> partition_export::Result<()> {
//!     let config = Config::from_file("export.toml")?;
//!     let storage = Storage::from_config(&config.storage).await?;
//!     let source = PostgresSource::connect(&config.database).await?;
//!
//!     let series = config.series_definitions()?;
//!     let summary = Exporter::new(&storage, &source, &config.export)
//!         .run(&series)
//!         .await?;
//!     println!("{} files published", summary.files_published());
//!
//!     source.close();
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use database::{ExportSource, PostgresSource};
pub use error::{ExportError, Result};
pub use export::{Exporter, RunSummary, SeriesDefinition};
pub use storage::Storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
