//! In-memory export sources for tests

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};

use crate::error::{ExportError, QueryError, Result};
use crate::export::RowFormat;

use super::{ChunkStream, ExportSource};

enum Behaviour {
    /// Emit these chunks, then fail if `then_fail`
    Chunks { chunks: Vec<Bytes>, then_fail: bool },
    /// Rows with timestamps, filtered by the query's quoted comparisons
    Rows(Vec<(DateTime<Utc>, String)>),
    /// Reject the query before any bytes are produced
    Reject,
    /// Emit one chunk and then never finish
    Hang,
}

/// Scriptable source recording every query it receives
pub(crate) struct MemorySource {
    behaviour: Behaviour,
    queries: Mutex<Vec<String>>,
}

impl MemorySource {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn chunks(chunks: &[&'static [u8]]) -> Self {
        Self::with(Behaviour::Chunks {
            chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(),
            then_fail: false,
        })
    }

    pub(crate) fn failing_after(chunks: &[&'static [u8]]) -> Self {
        Self::with(Behaviour::Chunks {
            chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(),
            then_fail: true,
        })
    }

    /// Keeps the rows whose timestamp satisfies every `<op> '<timestamp>'`
    /// comparison of the rendered query
    pub(crate) fn rows(rows: Vec<(DateTime<Utc>, String)>) -> Self {
        Self::with(Behaviour::Rows(rows))
    }

    pub(crate) fn rejecting() -> Self {
        Self::with(Behaviour::Reject)
    }

    pub(crate) fn hanging() -> Self {
        Self::with(Behaviour::Hang)
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Ge,
    Gt,
    Le,
    Lt,
}

impl Comparison {
    fn holds(self, ts: DateTime<Utc>, bound: DateTime<Utc>) -> bool {
        match self {
            Comparison::Ge => ts >= bound,
            Comparison::Gt => ts > bound,
            Comparison::Le => ts <= bound,
            Comparison::Lt => ts < bound,
        }
    }
}

/// Comparisons of the form `<op> '<rfc3339>'` found in `query`
fn comparisons(query: &str) -> Result<Vec<(Comparison, DateTime<Utc>)>> {
    let segments: Vec<&str> = query.split('\'').collect();
    let mut found = Vec::new();
    for pair in segments.windows(2).step_by(2) {
        let before = pair[0].trim_end();
        let op = if before.ends_with(">=") {
            Comparison::Ge
        } else if before.ends_with("<=") {
            Comparison::Le
        } else if before.ends_with('>') {
            Comparison::Gt
        } else if before.ends_with('<') {
            Comparison::Lt
        } else {
            continue;
        };
        let bound = DateTime::parse_from_rfc3339(pair[1])
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ExportError::from(QueryError::Execution(e.to_string())))?;
        found.push((op, bound));
    }
    if found.is_empty() {
        return Err(QueryError::Execution(format!("no time filter in query: {query}")).into());
    }
    Ok(found)
}

#[async_trait]
impl ExportSource for MemorySource {
    async fn copy_out(&self, query: &str, _format: RowFormat) -> Result<ChunkStream> {
        self.queries.lock().unwrap().push(query.to_string());

        match &self.behaviour {
            Behaviour::Chunks { chunks, then_fail } => {
                let mut items: Vec<Result<Bytes>> = chunks.iter().cloned().map(Ok).collect();
                if *then_fail {
                    items.push(Err(QueryError::Execution(
                        "canceling statement due to conflict with recovery".to_string(),
                    )
                    .into()));
                }
                Ok(stream::iter(items).boxed())
            }
            Behaviour::Rows(rows) => {
                let filter = comparisons(query)?;
                let lines: Vec<Result<Bytes>> = rows
                    .iter()
                    .filter(|(ts, _)| filter.iter().all(|(op, bound)| op.holds(*ts, *bound)))
                    .map(|(_, line)| Ok(Bytes::from(format!("{line}\n"))))
                    .collect();
                Ok(stream::iter(lines).boxed())
            }
            Behaviour::Reject => Err(QueryError::Execution(
                "relation \"fingerprint\" does not exist".to_string(),
            )
            .into()),
            Behaviour::Hang => Ok(stream::iter([Ok(Bytes::from_static(b"first\n"))])
                .chain(stream::pending())
                .boxed()),
        }
    }
}
