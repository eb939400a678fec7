//! Configuration management for partition-export
//!
//! This module handles loading, parsing, and validating configuration:
//! - Configuration files (TOML format)
//! - Command-line overrides (applied by the `cli` module)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments and their environment variables
//! 2. Configuration file
//! 3. Default values
//!
//! The resulting [`Config`] is built once and passed explicitly to the
//! exporter; nothing reads configuration from global state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::export::{Compression, Granularity, RowFormat, SeriesDefinition};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Target storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Export behaviour shared by all series
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Registered series, exported in this order
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub user: String,

    /// Never written back out by `config --show`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Root directory for the local backend
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

/// Available storage backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Directory tree on a local or mounted filesystem
    Local,
    /// Throwaway in-memory tree, for dry runs
    Memory,
}

/// Export behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Base directory inside the storage root holding all partition files
    #[serde(default)]
    pub directory: String,

    /// Row serialization produced by the database
    #[serde(default = "default_format")]
    pub format: RowFormat,

    /// Compression applied to the stream
    #[serde(default = "default_compression")]
    pub compression: Compression,

    /// Watermark used when a series has no published partitions yet
    #[serde(default = "default_epoch")]
    pub epoch: NaiveDate,

    /// Upper bound on windows exported per series in one run
    #[serde(default)]
    pub max_windows_per_series: Option<usize>,

    /// Capacity of the chunk channel between database and upload stages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Write buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// One exported series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub name: String,

    /// Inline query template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Query template file, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_file: Option<PathBuf>,

    #[serde(default = "default_granularity")]
    pub granularity: Granularity,

    #[serde(default = "default_incremental")]
    pub incremental: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_db_host() -> String {
    "127.0.0.1".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_format() -> RowFormat {
    RowFormat::Jsonl
}

fn default_compression() -> Compression {
    Compression::Gzip
}

fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default()
}

fn default_channel_capacity() -> usize {
    16
}

fn default_buffer_size() -> usize {
    16 * 1024
}

fn default_granularity() -> Granularity {
    Granularity::Day
}

fn default_incremental() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: String::new(),
            user: String::new(),
            password: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_storage_root(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            format: default_format(),
            compression: default_compression(),
            epoch: default_epoch(),
            max_windows_per_series: None,
            channel_capacity: default_channel_capacity(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from a file
    ///
    /// Relative `query_file` entries are resolved against the directory
    /// containing the configuration file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&text)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for series in &mut config.series {
            if let Some(file) = series.query_file.as_mut() {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        Ok(config)
    }

    /// Load configuration from an explicit path, or from the default path
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("partition-export")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.export.channel_capacity == 0 {
            return Err(invalid("export.channel_capacity", "0"));
        }
        if self.export.buffer_size == 0 {
            return Err(invalid("export.buffer_size", "0"));
        }
        if self.export.max_windows_per_series == Some(0) {
            return Err(invalid("export.max_windows_per_series", "0"));
        }

        let mut seen = HashSet::new();
        for series in &self.series {
            validate_series_name(&series.name)?;
            if !seen.insert(series.name.as_str()) {
                return Err(invalid("series.name", &series.name));
            }
            match (&series.query, &series.query_file) {
                (Some(_), Some(_)) => {
                    return Err(invalid(
                        &format!("series.{}", series.name),
                        "both query and query_file",
                    ));
                }
                (None, None) => {
                    return Err(ConfigError::MissingField(format!(
                        "series.{}.query",
                        series.name
                    ))
                    .into());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Build the immutable series definitions, reading query files
    pub fn series_definitions(&self) -> Result<Vec<SeriesDefinition>> {
        self.series
            .iter()
            .map(|series| {
                let query = match (&series.query, &series.query_file) {
                    (Some(query), _) => query.clone(),
                    (None, Some(file)) => std::fs::read_to_string(file).map_err(|e| {
                        ConfigError::FileNotFound(format!("{}: {}", file.display(), e))
                    })?,
                    (None, None) => {
                        return Err(ConfigError::MissingField(format!(
                            "series.{}.query",
                            series.name
                        ))
                        .into());
                    }
                };
                Ok(SeriesDefinition::new(
                    series.name.clone(),
                    query,
                    series.granularity,
                    series.incremental,
                ))
            })
            .collect()
    }
}

/// Series names end up as the first dot-separated field of file names
fn validate_series_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(invalid("series.name", name))
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    const SAMPLE: &str = r#"
[database]
host = "db.internal"
name = "fingerprint"
user = "export"
password = "secret"

[storage]
root = "/srv/export"

[export]
directory = "public"
format = "csv"
max_windows_per_series = 31

[[series]]
name = "fingerprint"
query = "SELECT id FROM fingerprint WHERE created >= '{{startTime}}' AND created < '{{endTime}}'"
granularity = "month"

[[series]]
name = "meta"
query = "SELECT id FROM meta"
incremental = false
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.export.format, RowFormat::Jsonl);
        assert_eq!(config.export.compression, Compression::Gzip);
        assert_eq!(
            config.export.epoch,
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
        );
        assert_eq!(config.export.buffer_size, 16 * 1024);
        assert!(config.series.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.password.as_deref(), Some("secret"));
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.export.format, RowFormat::Csv);
        assert_eq!(config.export.max_windows_per_series, Some(31));

        let defs = config.series_definitions().unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "fingerprint");
        assert_eq!(defs[0].granularity, Granularity::Month);
        assert!(defs[0].incremental);
        assert_eq!(defs[1].granularity, Granularity::Day);
        assert!(!defs[1].incremental);
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("fingerprint"));
    }

    #[test]
    fn test_rejects_dotted_series_name() {
        let mut config = Config::default();
        config.series.push(SeriesConfig {
            name: "fingerprint.v2".to_string(),
            query: Some("SELECT 1".to_string()),
            query_file: None,
            granularity: Granularity::Day,
            incremental: true,
        });
        assert!(matches!(
            config.validate(),
            Err(ExportError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_rejects_duplicate_and_missing_query() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.series.push(config.series[0].clone());
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.series[1].query = None;
        assert!(matches!(
            config.validate(),
            Err(ExportError::Config(ConfigError::MissingField(_)))
        ));
    }

    #[test]
    fn test_query_file_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sql")).unwrap();
        std::fs::write(
            dir.path().join("sql/track.sql"),
            "SELECT id FROM track WHERE updated < '{{endTime}}'",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[[series]]\nname = \"track\"\nquery_file = \"sql/track.sql\"\n",
        )
        .unwrap();

        let config = Config::from_file(dir.path().join("config.toml")).unwrap();
        config.validate().unwrap();
        let defs = config.series_definitions().unwrap();
        assert!(defs[0].query_template.contains("FROM track"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load_from_file(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(
            result,
            Err(ExportError::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
