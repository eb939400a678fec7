//! Partition sequencer
//!
//! Turns a watermark into the windows a run has to export and feeds them to a
//! [`WindowSink`] strictly in ascending order. The first failing window stops
//! the series, so coverage stays contiguous: a later run resumes from the
//! same watermark, never from a gap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Result;

use super::window::{Granularity, PartitionWindow, Windows};

/// Receiver of the windows a sequencer walks over
#[async_trait]
pub trait WindowSink: Send {
    /// Export one window; an error stops the sequence
    async fn export_window(&mut self, window: &PartitionWindow) -> Result<()>;
}

/// Plans and drives the windows of one series
#[derive(Debug, Clone, Copy)]
pub struct PartitionSequencer {
    granularity: Granularity,
    incremental: bool,
    max_windows: Option<usize>,
}

impl PartitionSequencer {
    pub fn new(granularity: Granularity, incremental: bool) -> Self {
        Self {
            granularity,
            incremental,
            max_windows: None,
        }
    }

    /// Export at most `max` windows per run
    pub fn with_limit(mut self, max: Option<usize>) -> Self {
        self.max_windows = max;
        self
    }

    /// Windows to export for `watermark` at time `now`
    ///
    /// Incremental series cover `[watermark, align(now))` gap-free. Snapshot
    /// series only ever export the latest complete window, whatever the
    /// watermark, since each snapshot supersedes the previous ones.
    pub fn windows(&self, watermark: DateTime<Utc>, now: DateTime<Utc>) -> Vec<PartitionWindow> {
        if !self.incremental {
            return self
                .granularity
                .retreat(self.granularity.align(now))
                .and_then(|start| PartitionWindow::starting_at(self.granularity, start))
                .into_iter()
                .collect();
        }

        let windows = Windows::new(self.granularity, watermark, now);
        match self.max_windows {
            Some(max) => windows.take(max).collect(),
            None => windows.collect(),
        }
    }

    /// Feed `windows` to `sink` one at a time, stopping at the first failure
    ///
    /// # Returns
    /// * `Result<usize>` - Number of windows handled, or the error of the
    ///   first window that failed
    pub async fn run<S>(&self, windows: &[PartitionWindow], sink: &mut S) -> Result<usize>
    where
        S: WindowSink + ?Sized,
    {
        for (index, window) in windows.iter().enumerate() {
            debug!(window = %window, "Window {}/{}", index + 1, windows.len());
            if let Err(e) = sink.export_window(window).await {
                warn!(
                    window = %window,
                    "Stopping after {} of {} windows: {}",
                    index,
                    windows.len(),
                    e
                );
                return Err(e);
            }
        }
        Ok(windows.len())
    }
}
