//! Streaming dump pipeline
//!
//! Exports one window into one partition file through two concurrent stages,
//! joined within the calling task:
//!
//! 1. The producer pulls byte chunks off the database's COPY stream and sends
//!    them into a bounded channel.
//! 2. The consumer receives chunks, compresses them and writes them through a
//!    buffer into a temp file next to the final path.
//!
//! The channel applies backpressure, so at most `channel_capacity` chunks are
//! held in memory. A failing stage cancels the shared stage token before it
//! lets go of its channel end, so its sibling stops promptly and reports
//! [`ExportError::Aborted`] rather than a misleading error of its own.
//!
//! On success the temp file is renamed to the final path. On any failure the
//! temp file is removed and the final path is never created.

use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::database::ExportSource;
use crate::error::{ExportError, Result, StorageError};
use crate::storage::{Storage, StorageWriter};

use super::format::{FileFormat, RowFormat};
use super::naming;
use super::query::QueryRenderer;
use super::window::PartitionWindow;

/// Default chunk channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default write buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Tuning for a dump
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Serialization and compression of the produced file
    pub format: FileFormat,
    /// Chunks buffered between the stages
    pub channel_capacity: usize,
    /// Write buffer in front of the storage handle
    pub buffer_size: usize,
}

impl PipelineOptions {
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Result of a published dump
#[derive(Debug, Clone)]
pub struct DumpResult {
    /// Final path of the published file
    pub path: String,
    /// Uncompressed bytes received from the database
    pub bytes_read: u64,
    /// Size of the published file
    pub bytes_written: u64,
    /// Chunks received from the database
    pub chunks: u64,
    /// Time taken for the dump
    pub elapsed_ms: u64,
}

/// Counters reported by the consumer stage
struct Written {
    bytes: u64,
    chunks: u64,
}

/// Pipeline executing one window's export against a storage and a source
pub struct DumpPipeline<'a> {
    storage: &'a Storage,
    source: &'a dyn ExportSource,
    renderer: &'a QueryRenderer,
    options: PipelineOptions,
    cancel_token: CancellationToken,
}

impl<'a> DumpPipeline<'a> {
    pub fn new(
        storage: &'a Storage,
        source: &'a dyn ExportSource,
        renderer: &'a QueryRenderer,
        options: PipelineOptions,
    ) -> Self {
        Self {
            storage,
            source,
            renderer,
            options,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set cancellation token for this pipeline
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Export `window` of the query `template` and publish it at `final_path`
    ///
    /// # Arguments
    /// * `template` - Extraction query template
    /// * `window` - Window whose bounds are substituted into the template
    /// * `final_path` - Path the partition is published under; must not exist
    ///
    /// # Returns
    /// * `Result<DumpResult>` - Statistics of the published file, or the
    ///   error that stopped the dump after the temp file was cleaned up
    pub async fn dump(
        &self,
        template: &str,
        window: &PartitionWindow,
        final_path: &str,
    ) -> Result<DumpResult> {
        let start_time = Instant::now();
        let query = self.renderer.render(template, window)?;

        let temp_path = naming::temp_path(final_path);
        debug!(path = %temp_path, "Creating temporary file");
        let writer = self.storage.create(&temp_path).await?;

        let written = match self.stream(&query, writer, &temp_path).await {
            Ok(written) => written,
            Err(e) => {
                self.discard(&temp_path).await;
                return Err(e);
            }
        };

        if self.cancel_token.is_cancelled() {
            self.discard(&temp_path).await;
            return Err(ExportError::Cancelled);
        }

        if let Err(e) = self.storage.rename(&temp_path, final_path).await {
            error!(path = %final_path, "Failed to publish {}: {}", temp_path, e);
            self.discard(&temp_path).await;
            return Err(e.into());
        }

        let bytes_written = match self.storage.stat(final_path).await {
            Ok(info) => info.size,
            Err(e) => {
                warn!(path = %final_path, "Failed to stat published file: {}", e);
                0
            }
        };
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            path = %final_path,
            "Published {} bytes ({} uncompressed, {} chunks) in {} ms",
            bytes_written, written.bytes, written.chunks, elapsed_ms
        );

        Ok(DumpResult {
            path: final_path.to_string(),
            bytes_read: written.bytes,
            bytes_written,
            chunks: written.chunks,
            elapsed_ms,
        })
    }

    /// Run both stages to completion and resolve their outcomes
    async fn stream(&self, query: &str, writer: StorageWriter, temp_path: &str) -> Result<Written> {
        let stages = self.cancel_token.child_token();
        let (tx, rx) = mpsc::channel::<Bytes>(self.options.channel_capacity);

        let source = self.source;
        let rows = self.options.format.rows;
        let producer_token = stages.clone();
        let producer = async move {
            let result = produce(source, query, rows, &tx, &producer_token).await;
            if result.is_err() {
                producer_token.cancel();
            }
            drop(tx);
            result
        };

        let options = self.options;
        let consumer_token = stages.clone();
        let consumer = async move {
            let result = consume(writer, rx, options, temp_path, &consumer_token).await;
            if result.is_err() {
                consumer_token.cancel();
            }
            result
        };

        let (produced, consumed) = tokio::join!(producer, consumer);

        if self.cancel_token.is_cancelled() {
            debug!(path = %temp_path, "Dump cancelled");
            return Err(ExportError::Cancelled);
        }

        match (produced, consumed) {
            (Ok(_), Ok(written)) => Ok(written),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            // Report the stage that failed first, not the one it stopped
            (Err(ExportError::Aborted(_)), Err(e)) => Err(e),
            (Err(e), Err(_)) => Err(e),
        }
    }

    /// Remove a temp file, tolerating its absence
    async fn discard(&self, temp_path: &str) {
        match self.storage.remove(temp_path).await {
            Ok(()) => debug!(path = %temp_path, "Removed temporary file"),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => warn!(
                path = %temp_path,
                "Failed to remove temporary file, the next scan will sweep it: {}", e
            ),
        }
    }
}

/// Producer stage: database COPY stream into the channel
async fn produce(
    source: &dyn ExportSource,
    query: &str,
    format: RowFormat,
    tx: &mpsc::Sender<Bytes>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(aborted("database export")),
        stream = source.copy_out(query, format) => stream?,
    };

    let mut bytes = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(aborted("database export")),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                bytes += chunk.len() as u64;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(aborted("database export")),
                    sent = tx.send(chunk) => {
                        if sent.is_err() {
                            return Err(aborted("database export"));
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!("Database export failed: {}", e);
                return Err(e);
            }
            None => break,
        }
    }

    debug!("Database export finished: {} bytes", bytes);
    Ok(bytes)
}

/// Consumer stage: channel into compressor, buffer and storage handle
async fn consume(
    writer: StorageWriter,
    mut rx: mpsc::Receiver<Bytes>,
    options: PipelineOptions,
    temp_path: &str,
    cancel: &CancellationToken,
) -> Result<Written> {
    let buffered = BufWriter::with_capacity(options.buffer_size, writer);
    let mut encoder = options.format.compression.encoder(buffered);
    let io_error = |e: std::io::Error| ExportError::from(StorageError::from_io(temp_path, e));

    let mut written = Written { bytes: 0, chunks: 0 };
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(aborted("upload")),
            chunk = rx.recv() => chunk,
        };
        let Some(chunk) = chunk else { break };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(aborted("upload")),
            result = encoder.write_all(&chunk) => result.map_err(|e| {
                error!(path = %temp_path, "Write failed: {}", e);
                io_error(e)
            })?,
        }

        written.bytes += chunk.len() as u64;
        written.chunks += 1;
        if written.chunks % 1000 == 0 {
            debug!(
                path = %temp_path,
                "Progress: {} bytes in {} chunks", written.bytes, written.chunks
            );
        }
    }

    // Finishes the compressed stream, flushes the buffer and closes the handle
    encoder.shutdown().await.map_err(|e| {
        error!(path = %temp_path, "Failed to finalize file: {}", e);
        io_error(e)
    })?;

    Ok(written)
}

fn aborted(stage: &str) -> ExportError {
    ExportError::Aborted(format!("{stage} stopped"))
}
