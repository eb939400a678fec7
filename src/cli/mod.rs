//! Command-line interface for partition-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Command-line overrides of configuration values
//! - The `config` and `version` subcommands

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::export::QueryRenderer;

/// Incremental, crash-safe export of time-partitioned tables
#[derive(Parser, Debug)]
#[command(
    name = "partition-export",
    version,
    about = "Export time-partitioned database slices as compressed files",
    long_about = "Exports every complete time window not yet present in the target directory,
one compressed file per window, publishing each file atomically. Safe to re-run after a crash."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Database host
    #[arg(long, value_name = "HOST")]
    pub database_host: Option<String>,

    /// Database port
    #[arg(long, value_name = "PORT")]
    pub database_port: Option<u16>,

    /// Database name
    #[arg(long, value_name = "NAME")]
    pub database_name: Option<String>,

    /// Database user
    #[arg(long, value_name = "USER")]
    pub database_user: Option<String>,

    /// Database password
    #[arg(
        long,
        value_name = "PASSWORD",
        env = "PARTITION_EXPORT_DATABASE_PASSWORD",
        hide_env_values = true
    )]
    pub database_password: Option<String>,

    /// Root directory of the local storage backend
    #[arg(long, value_name = "DIR")]
    pub storage_root: Option<PathBuf>,

    /// Export directory inside the storage root
    #[arg(long, value_name = "DIR")]
    pub export_directory: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for partition-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the export (default)
    Export,

    /// Show version information
    Version,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        let args = CliArgs::parse();
        let config = Self::load_config(&args)?;

        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Explicit configuration file, if one was given
    pub fn config_path(&self) -> Option<&Path> {
        self.args.config_file.as_deref()
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        Self::apply_database_args(config, args);
        Self::apply_storage_args(config, args);
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Apply database-related CLI arguments to configuration
    fn apply_database_args(config: &mut Config, args: &CliArgs) {
        if let Some(host) = &args.database_host {
            config.database.host = host.clone();
        }
        if let Some(port) = args.database_port {
            config.database.port = port;
        }
        if let Some(name) = &args.database_name {
            config.database.name = name.clone();
        }
        if let Some(user) = &args.database_user {
            config.database.user = user.clone();
        }
        if let Some(password) = &args.database_password {
            config.database.password = Some(password.clone());
        }
    }

    /// Apply storage-related CLI arguments to configuration
    fn apply_storage_args(config: &mut Config, args: &CliArgs) {
        if let Some(root) = &args.storage_root {
            config.storage.root = root.clone();
        }
        if let Some(directory) = &args.export_directory {
            config.export.directory = directory.clone();
        }
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to run the export
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            Some(Commands::Export) | None => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("partition-export version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config()?;
        }

        if show {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate the effective configuration, including query templates
    fn validate_config(&self) -> Result<()> {
        println!("Validating configuration file: {}", self.get_config_path().display());

        match self.check_config() {
            Ok(count) => {
                println!("✅ Configuration is valid ({} series)", count);
                Ok(())
            }
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Structural validation plus a compile of every query template
    ///
    /// # Returns
    /// * `Result<usize>` - Number of valid series
    pub fn check_config(&self) -> Result<usize> {
        self.config.validate()?;
        let renderer = QueryRenderer::new();
        let series = self.config.series_definitions()?;
        for definition in &series {
            renderer.validate(&definition.query_template).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("series.{}.query", definition.name),
                    value: e.to_string(),
                }
            })?;
        }
        Ok(series.len())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.get_config_path().display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml_string()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}
