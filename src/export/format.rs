//! Row serialization and compression formats
//!
//! The database serializes rows itself (server-side `COPY`); this module only
//! decides how the query is wrapped and which streaming codec the bytes pass
//! through on their way to storage.

use std::fmt;

use async_compression::Level;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use async_compression::tokio::write::{GzipEncoder, ZstdEncoder};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Row serialization produced by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFormat {
    /// Tab-delimited text
    Text,
    /// CSV with a header row
    Csv,
    /// One JSON object per line, nulls stripped
    Jsonl,
}

impl RowFormat {
    /// File extension before the compression suffix
    pub fn extension(&self) -> &'static str {
        match self {
            RowFormat::Text => "tsv",
            RowFormat::Csv => "csv",
            RowFormat::Jsonl => "jsonl",
        }
    }

    /// Wrap a read query into a `COPY ... TO STDOUT` statement
    pub fn copy_statement(&self, query: &str) -> String {
        let query = query.trim().trim_end_matches(';').trim_end();
        match self {
            RowFormat::Text => format!("COPY ({query}) TO STDOUT"),
            RowFormat::Csv => format!("COPY ({query}) TO STDOUT WITH (FORMAT csv, HEADER true)"),
            RowFormat::Jsonl => format!(
                "COPY (SELECT json_strip_nulls(row_to_json(r)) FROM ({query}) r) TO STDOUT"
            ),
        }
    }
}

/// Streaming compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
            Compression::Zstd => "zst",
        }
    }

    /// Wrap a writer in a streaming encoder
    ///
    /// Shutting the returned writer down finishes the compressed stream and
    /// then shuts the inner writer down.
    pub fn encoder<'a, W>(&self, inner: W) -> Box<dyn AsyncWrite + Send + Unpin + 'a>
    where
        W: AsyncWrite + Send + Unpin + 'a,
    {
        match self {
            Compression::Gzip => Box::new(GzipEncoder::with_quality(inner, Level::Default)),
            Compression::Zstd => Box::new(ZstdEncoder::with_quality(inner, Level::Default)),
        }
    }

    /// Wrap a reader in a streaming decoder
    pub fn decoder<'a, R>(&self, inner: R) -> Box<dyn AsyncRead + Send + Unpin + 'a>
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        let buffered = BufReader::new(inner);
        match self {
            Compression::Gzip => Box::new(GzipDecoder::new(buffered)),
            Compression::Zstd => Box::new(ZstdDecoder::new(buffered)),
        }
    }
}

/// Combined serialization and compression, e.g. `csv.gz`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFormat {
    pub rows: RowFormat,
    pub compression: Compression,
}

impl FileFormat {
    pub fn new(rows: RowFormat, compression: Compression) -> Self {
        Self { rows, compression }
    }

    pub fn extension(&self) -> String {
        format!("{}.{}", self.rows.extension(), self.compression.extension())
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_extensions() {
        assert_eq!(FileFormat::new(RowFormat::Csv, Compression::Gzip).extension(), "csv.gz");
        assert_eq!(FileFormat::new(RowFormat::Jsonl, Compression::Zstd).extension(), "jsonl.zst");
        assert_eq!(FileFormat::new(RowFormat::Text, Compression::Gzip).to_string(), "tsv.gz");
    }

    #[test]
    fn test_copy_statements() {
        let q = "SELECT id FROM fingerprint;\n";
        assert_eq!(
            RowFormat::Text.copy_statement(q),
            "COPY (SELECT id FROM fingerprint) TO STDOUT"
        );
        assert_eq!(
            RowFormat::Csv.copy_statement(q),
            "COPY (SELECT id FROM fingerprint) TO STDOUT WITH (FORMAT csv, HEADER true)"
        );
        assert_eq!(
            RowFormat::Jsonl.copy_statement(q),
            "COPY (SELECT json_strip_nulls(row_to_json(r)) FROM (SELECT id FROM fingerprint) r) TO STDOUT"
        );
    }

    #[tokio::test]
    async fn test_codecs_stream_through() {
        for compression in [Compression::Gzip, Compression::Zstd] {
            let mut compressed = Vec::new();
            {
                let mut encoder = compression.encoder(&mut compressed);
                encoder.write_all(b"{\"id\":1}\n{\"id\":2}\n").await.unwrap();
                encoder.shutdown().await.unwrap();
            }
            assert!(!compressed.is_empty());

            let mut decoder = compression.decoder(&compressed[..]);
            let mut plain = String::new();
            decoder.read_to_string(&mut plain).await.unwrap();
            assert_eq!(plain.lines().count(), 2, "{compression:?}");
        }
    }
}
