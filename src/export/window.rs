//! Calendar-aligned partition windows
//!
//! A window is the half-open range `[start, end)`; a row whose timestamp
//! equals `end` belongs to the next window. All times are UTC.

use std::fmt;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Partition granularity of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

impl Granularity {
    /// Round `t` down to the start of its period
    pub fn align(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let date = match self {
            Granularity::Day => t.date_naive(),
            Granularity::Month => t.date_naive().with_day(1).unwrap_or(t.date_naive()),
        };
        date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Move an aligned instant forward by one period
    pub fn advance(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Granularity::Day => t.checked_add_days(Days::new(1)),
            Granularity::Month => t.checked_add_months(Months::new(1)),
        }
    }

    /// Move an aligned instant back by one period
    pub fn retreat(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Granularity::Day => t.checked_sub_days(Days::new(1)),
            Granularity::Month => t.checked_sub_months(Months::new(1)),
        }
    }

    /// Date layout used in partition file names
    fn date_format(&self) -> &'static str {
        match self {
            Granularity::Day => "%Y-%m-%d",
            Granularity::Month => "%Y-%m",
        }
    }

    /// Render a window start for a file name (`2021-01-31` or `2021-01`)
    pub fn format_start(&self, start: DateTime<Utc>) -> String {
        start.format(self.date_format()).to_string()
    }

    /// Parse a window start from a file name, accepting only the canonical form
    pub fn parse_start(&self, text: &str) -> Option<DateTime<Utc>> {
        let date = match self {
            Granularity::Day => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?,
            Granularity::Month => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok()?,
        };
        let start = date.and_time(NaiveTime::MIN).and_utc();
        (self.format_start(start) == text).then_some(start)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

/// Half-open time range `[start, end)` covered by one partition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PartitionWindow {
    /// The window of the given granularity starting at aligned `start`
    pub fn starting_at(granularity: Granularity, start: DateTime<Utc>) -> Option<Self> {
        let start = granularity.align(start);
        let end = granularity.advance(start)?;
        Some(Self { start, end })
    }
}

impl fmt::Display for PartitionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Midnight UTC of a configured epoch date
pub fn epoch_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Ordered, gap-free windows from a watermark up to `now`
///
/// Yields `[R, R+g)`, `[R+g, R+2g)`, ... while `end <= align(now)`.
#[derive(Debug, Clone)]
pub struct Windows {
    granularity: Granularity,
    next_start: DateTime<Utc>,
    limit: DateTime<Utc>,
}

impl Windows {
    pub fn new(granularity: Granularity, watermark: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            granularity,
            next_start: granularity.align(watermark),
            limit: granularity.align(now),
        }
    }
}

impl Iterator for Windows {
    type Item = PartitionWindow;

    fn next(&mut self) -> Option<PartitionWindow> {
        let window = PartitionWindow::starting_at(self.granularity, self.next_start)?;
        if window.end > self.limit {
            return None;
        }
        self.next_start = window.end;
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_align() {
        assert_eq!(Granularity::Day.align(utc(2021, 3, 15, 13)), utc(2021, 3, 15, 0));
        assert_eq!(Granularity::Month.align(utc(2021, 3, 15, 13)), utc(2021, 3, 1, 0));
        assert_eq!(Granularity::Month.align(utc(2021, 3, 1, 0)), utc(2021, 3, 1, 0));
    }

    #[test]
    fn test_advance_handles_month_lengths() {
        assert_eq!(Granularity::Month.advance(utc(2021, 1, 1, 0)), Some(utc(2021, 2, 1, 0)));
        assert_eq!(Granularity::Month.advance(utc(2021, 12, 1, 0)), Some(utc(2022, 1, 1, 0)));
        assert_eq!(Granularity::Day.advance(utc(2020, 2, 28, 0)), Some(utc(2020, 2, 29, 0)));
        assert_eq!(Granularity::Month.retreat(utc(2021, 1, 1, 0)), Some(utc(2020, 12, 1, 0)));
    }

    #[test]
    fn test_format_and_parse_start() {
        assert_eq!(Granularity::Month.format_start(utc(2021, 1, 1, 0)), "2021-01");
        assert_eq!(Granularity::Day.format_start(utc(2021, 1, 9, 0)), "2021-01-09");

        assert_eq!(Granularity::Month.parse_start("2021-01"), Some(utc(2021, 1, 1, 0)));
        assert_eq!(Granularity::Day.parse_start("2021-01-09"), Some(utc(2021, 1, 9, 0)));
        assert_eq!(Granularity::Month.parse_start("2021-1"), None);
        assert_eq!(Granularity::Month.parse_start("2021-01-01"), None);
        assert_eq!(Granularity::Day.parse_start("2021-02-30"), None);
        assert_eq!(Granularity::Day.parse_start("delta"), None);
    }

    #[test]
    fn test_window_is_half_open() {
        let window = PartitionWindow::starting_at(Granularity::Day, utc(2021, 1, 1, 0)).unwrap();
        assert_eq!(window.start, utc(2021, 1, 1, 0));
        assert_eq!(window.end, utc(2021, 1, 2, 0));
        let next = PartitionWindow::starting_at(Granularity::Day, window.end).unwrap();
        assert_eq!(next.start, window.end);
        assert_eq!(
            window.to_string(),
            "[2021-01-01T00:00:00Z, 2021-01-02T00:00:00Z)"
        );
    }

    #[test]
    fn test_windows_cover_range_without_gaps() {
        let windows: Vec<_> =
            Windows::new(Granularity::Month, utc(2021, 1, 1, 0), utc(2021, 4, 17, 9)).collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start, utc(2021, 1, 1, 0));
        assert_eq!(windows[2].end, utc(2021, 4, 1, 0));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_windows_empty_when_caught_up() {
        let now = utc(2021, 3, 10, 12);
        assert_eq!(Windows::new(Granularity::Day, utc(2021, 3, 10, 0), now).count(), 0);
        assert_eq!(Windows::new(Granularity::Day, utc(2021, 3, 11, 0), now).count(), 0);
        assert_eq!(Windows::new(Granularity::Day, utc(2021, 3, 9, 0), now).count(), 1);
    }
}
