//! Error handling for export runs.
//!
//! All fallible operations in the crate return [`Result`], whose error type
//! [`ExportError`] wraps a small taxonomy of more specific kinds:
//!
//! - [`ConnectionError`]: the database or the storage backend is unreachable
//! - [`QueryError`]: the extraction query could not be rendered or executed
//! - [`StorageError`]: a filesystem-like operation on the store failed
//! - [`ConfigError`]: the configuration file or flags are invalid
//!
//! # Example
//!
//! ```rust
//! use partition_export::error::{ExportError, StorageError};
//!
//! let err: ExportError = StorageError::NotFound("exports/a.csv.gz".to_string()).into();
//! assert!(matches!(err, ExportError::Storage(StorageError::NotFound(_))));
//! assert!(!err.is_cancelled());
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, ConnectionError, ExportError, QueryError, Result, StorageError};
