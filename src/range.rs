//! Inclusive time window used to filter chat history.

use chrono::{DateTime, TimeZone, Utc};

use crate::calendar::{Zone, BANNER_FORMAT};
use crate::error::{Error, Result};

/// Inclusive `[start, end]` window, stored in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        let start = start.with_timezone(&Utc);
        let end = end.with_timezone(&Utc);
        if start > end {
            return Err(Error::InvalidRange(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// True once history walking has gone past the lower bound.
    pub fn is_before_start(&self, ts: DateTime<Utc>) -> bool {
        ts < self.start
    }

    pub fn is_after_end(&self, ts: DateTime<Utc>) -> bool {
        ts > self.end
    }

    /// "01.05.2024 00:00 — 31.05.2024 23:59" in the given zone.
    pub fn describe(&self, tz: &Zone) -> String {
        format!(
            "{} — {}",
            self.start.with_timezone(tz).format(BANNER_FORMAT),
            self.end.with_timezone(tz).format(BANNER_FORMAT)
        )
    }
}
