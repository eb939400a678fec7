//! Partition file naming
//!
//! Finalized partitions are named `<series>.<token>.<window-start>.<ext>`,
//! for example `fingerprint.delta.2021-01.csv.gz`. The token is `delta` for
//! incremental series and `full` for snapshot series; the date layout follows
//! the series granularity.
//!
//! Files under construction are named `.<final-name>.<uuid>.tmp`. Series
//! names never start with a dot, so no temp name can parse as a partition.

use uuid::Uuid;

use crate::storage::path;

use super::format::FileFormat;
use super::window::{Granularity, PartitionWindow};
use super::SeriesDefinition;

const TEMP_PREFIX: char = '.';
const TEMP_SUFFIX: &str = ".tmp";

/// Token for incremental series
pub const DELTA_TOKEN: &str = "delta";

/// Token for full-snapshot series
pub const FULL_TOKEN: &str = "full";

/// Naming grammar of one series
#[derive(Debug, Clone)]
pub struct PartitionNaming {
    series: String,
    token: &'static str,
    granularity: Granularity,
    extension: String,
}

impl PartitionNaming {
    pub fn new(series: &SeriesDefinition, format: FileFormat) -> Self {
        Self {
            series: series.name.clone(),
            token: if series.incremental {
                DELTA_TOKEN
            } else {
                FULL_TOKEN
            },
            granularity: series.granularity,
            extension: format.extension(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Final file name for a window
    pub fn file_name(&self, window: &PartitionWindow) -> String {
        format!(
            "{}.{}.{}.{}",
            self.series,
            self.token,
            self.granularity.format_start(window.start),
            self.extension
        )
    }

    /// Parse a finalized file name of this series back into its window
    ///
    /// Returns `None` for temp files, other series, other formats, and
    /// anything else that does not match the grammar exactly.
    pub fn parse(&self, name: &str) -> Option<PartitionWindow> {
        let date = name
            .strip_prefix(self.series.as_str())?
            .strip_prefix('.')?
            .strip_prefix(self.token)?
            .strip_prefix('.')?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        let start = self.granularity.parse_start(date)?;
        PartitionWindow::starting_at(self.granularity, start)
    }
}

/// Whether a file name carries the reserved temp marker
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

/// A fresh temp path next to `final_path`, in the same directory
pub fn temp_path(final_path: &str) -> String {
    let (dir, name) = path::split(final_path);
    let temp = format!("{TEMP_PREFIX}{name}.{}{TEMP_SUFFIX}", Uuid::new_v4().simple());
    path::join(&[dir, temp.as_str()])
}
