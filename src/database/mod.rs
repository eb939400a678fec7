//! Database collaborator
//!
//! The exporter needs exactly one capability from the database: stream the
//! result set of an arbitrary read query, serialized server-side, as a
//! sequence of byte chunks. Rows are never collected in memory.

pub mod killable;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::export::RowFormat;

pub use postgres::PostgresSource;

/// Stream of serialized result-set bytes
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Source able to bulk-export a query's result set
#[async_trait]
pub trait ExportSource: Send + Sync {
    /// Start a server-side export of `query` in the given row format
    ///
    /// # Arguments
    /// * `query` - Fully rendered read query
    /// * `format` - Row serialization
    ///
    /// # Returns
    /// * `Result<ChunkStream>` - Byte chunks in arrival order; dropping the
    ///   stream abandons the export
    async fn copy_out(&self, query: &str, format: RowFormat) -> Result<ChunkStream>;
}
