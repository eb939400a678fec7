//! PostgreSQL export source
//!
//! Streams `COPY (...) TO STDOUT` output straight off the wire. The
//! connection driver runs on its own task for the lifetime of the source and
//! is aborted when the source is closed or dropped.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::{ConnectionError, ExportError, QueryError, Result};
use crate::export::RowFormat;

use super::killable::{self, KillableStream};
use super::{ChunkStream, ExportSource};

/// Classify a driver error: a lost connection is fatal to the run, anything
/// else only to the current window
fn classify(err: tokio_postgres::Error) -> ExportError {
    if err.is_closed() {
        ConnectionError::Database(err.to_string()).into()
    } else {
        QueryError::Execution(err.to_string()).into()
    }
}

/// Export source backed by a single PostgreSQL connection
pub struct PostgresSource {
    client: Client,
    connection: JoinHandle<()>,
}

impl PostgresSource {
    /// Connect to the configured database
    ///
    /// # Returns
    /// * `Result<Self>` - Connected source or a connection error
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.name)
            .user(&config.user)
            .application_name("partition-export");
        if let Some(password) = &config.password {
            pg.password(password);
        }

        debug!(
            "Connecting to PostgreSQL at {}:{} (database: {}, user: {})",
            config.host, config.port, config.name, config.user
        );

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| ConnectionError::Database(e.to_string()))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        info!("Connected to PostgreSQL at {}:{}", config.host, config.port);
        Ok(Self { client, connection })
    }

    /// Close the connection
    pub fn close(self) {
        debug!("Closing PostgreSQL connection");
        drop(self);
    }
}

impl Drop for PostgresSource {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

#[async_trait]
impl ExportSource for PostgresSource {
    async fn copy_out(&self, query: &str, format: RowFormat) -> Result<ChunkStream> {
        let statement = format.copy_statement(query);
        debug!("Starting COPY: {}", statement);

        let stream = self
            .client
            .copy_out(statement.as_str())
            .await
            .map_err(classify)?;

        let kill = killable::cancel_query(self.client.cancel_token());
        Ok(KillableStream::new(stream.map_err(classify).boxed(), kill).boxed())
    }
}
