//! partition-export
//!
//! Periodic batch job exporting time-partitioned database slices into
//! compressed files. Meant to be invoked by a scheduler; every invocation
//! exports what is missing and exits. A non-zero exit status means the run
//! failed and can simply be retried.
//!
//! # Usage
//!
//! ```bash
//! partition-export -c /etc/partition-export/config.toml
//! partition-export -c config.toml config --validate
//! ```

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use partition_export::cli::CliInterface;
use partition_export::error::Result;
use partition_export::{Exporter, PostgresSource, Storage};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments
/// 2. Load configuration
/// 3. Initialize logging
/// 4. Handle subcommands or run the export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    run_export(&cli).await
}

/// Connect collaborators, run every series and release them on all paths
async fn run_export(cli: &CliInterface) -> Result<()> {
    let config = cli.config();
    cli.check_config()?;
    let series = config.series_definitions()?;
    if series.is_empty() {
        warn!("No series configured, nothing to export");
        return Ok(());
    }

    let cancel_token = CancellationToken::new();
    let signal_handle = spawn_signal_listener(cancel_token.clone());

    let storage = Storage::from_config(&config.storage).await?;
    info!("Using storage {}", storage.describe());

    let source = match PostgresSource::connect(&config.database).await {
        Ok(source) => source,
        Err(e) => {
            signal_handle.abort();
            return Err(e);
        }
    };

    let result = Exporter::new(&storage, &source, &config.export)
        .with_cancellation(cancel_token)
        .run(&series)
        .await;

    source.close();
    signal_handle.abort();

    let summary = result?;
    if cli.args().json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Failed to render summary: {e}"))?;
        println!("{}", json);
    }
    Ok(())
}

/// Cancel the run on Ctrl+C or SIGTERM
fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    eprintln!("Failed to listen for SIGTERM: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    eprintln!("Failed to listen for Ctrl+C: {}", err);
                    return;
                }
            }
            _ = terminate => {}
        }

        warn!("Termination requested, cancelling export");
        token.cancel();
    })
}

/// Initialize logging system based on verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
/// Logs go to stderr so that `--json` output stays machine-readable.
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    // Configure timestamps
    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
