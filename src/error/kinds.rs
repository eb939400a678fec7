use std::{fmt, io};

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export runs.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Database or storage could not be reached. Fatal to the whole run.
    Connection(ConnectionError),

    /// Query rendering or execution failed. Fatal to the current window.
    Query(QueryError),

    /// Storage operation failed.
    Storage(StorageError),

    /// Configuration errors.
    Config(ConfigError),

    /// The run was cancelled by an external signal.
    Cancelled,

    /// A pipeline stage stopped because the other stage failed.
    Aborted(String),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to connect to the database.
    Database(String),

    /// Failed to open the storage backend.
    Storage(String),
}

/// Query-specific errors.
#[derive(Debug)]
pub enum QueryError {
    /// Template is malformed or references an unknown placeholder.
    Template(String),

    /// The database rejected or aborted the export.
    Execution(String),
}

/// Storage-specific errors. None of these are retried.
#[derive(Debug)]
pub enum StorageError {
    /// Path does not exist.
    NotFound(String),

    /// Backend refused access to the path.
    PermissionDenied(String),

    /// Any other I/O failure.
    Io { path: String, source: io::Error },
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ExportError {
    /// Whether this error was caused by cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }
}

impl StorageError {
    /// Classify an I/O error raised while operating on `path`.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path),
            _ => StorageError::Io { path, source: err },
        }
    }

    /// Shorthand for an I/O error built from a message.
    pub fn other(path: impl Into<String>, msg: impl Into<String>) -> Self {
        StorageError::Io {
            path: path.into(),
            source: io::Error::other(msg.into()),
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Connection(e) => write!(f, "Connection error: {e}"),
            ExportError::Query(e) => write!(f, "Query error: {e}"),
            ExportError::Storage(e) => write!(f, "Storage error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Cancelled => write!(f, "Export cancelled"),
            ExportError::Aborted(msg) => write!(f, "Export aborted: {msg}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Database(msg) => write!(f, "Failed to connect to database: {msg}"),
            ConnectionError::Storage(msg) => write!(f, "Failed to open storage: {msg}"),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Template(msg) => write!(f, "Invalid query template: {msg}"),
            QueryError::Execution(msg) => write!(f, "Query failed: {msg}"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(path) => write!(f, "Not found: {path}"),
            StorageError::PermissionDenied(path) => write!(f, "Permission denied: {path}"),
            StorageError::Io { path, source } => write!(f, "I/O error on {path}: {source}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Storage(StorageError::Io { source, .. }) => Some(source),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for QueryError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<ConnectionError> for ExportError {
    fn from(err: ConnectionError) -> Self {
        ExportError::Connection(err)
    }
}

impl From<QueryError> for ExportError {
    fn from(err: QueryError) -> Self {
        ExportError::Query(err)
    }
}

impl From<StorageError> for ExportError {
    fn from(err: StorageError) -> Self {
        ExportError::Storage(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<minijinja::Error> for ExportError {
    fn from(err: minijinja::Error) -> Self {
        ExportError::Query(QueryError::Template(err.to_string()))
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let err = StorageError::from_io("a/b", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, StorageError::NotFound(ref p) if p == "a/b"));

        let err = StorageError::from_io("a/b", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, StorageError::PermissionDenied(_)));

        let err = StorageError::from_io("a/b", io::Error::other("disk full"));
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_cancelled_is_a_branch() {
        let err: ExportError = StorageError::NotFound("x".to_string()).into();
        assert!(matches!(err, ExportError::Storage(StorageError::NotFound(_))));
        assert!(!err.is_cancelled());
        assert!(ExportError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_display_includes_context() {
        let err: ExportError = QueryError::Template("unexpected end of input".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Query error: Invalid query template: unexpected end of input"
        );

        let err: ExportError = StorageError::other("exports/x.tmp", "boom").into();
        assert!(err.to_string().contains("exports/x.tmp"));
    }
}
