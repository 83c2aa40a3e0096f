//! Calendar helpers: the configured time zone, Russian month names and
//! the daily/monthly file naming used for rollover.

use std::fmt;

use chrono::offset::MappedLocalTime;
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_TIMEZONE: &str = "Europe/Moscow";

/// Timestamp format used in every log entry.
pub const ENTRY_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Timestamp format used in banners and range summaries.
pub const BANNER_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Timestamp format embedded into report file names.
pub const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub const RUS_MONTHS: [&str; 12] = [
    "Январь",
    "Февраль",
    "Март",
    "Апрель",
    "Май",
    "Июнь",
    "Июль",
    "Август",
    "Сентябрь",
    "Октябрь",
    "Ноябрь",
    "Декабрь",
];

/// Russian name of a 1-based month number.
pub fn month_name(month: u32) -> &'static str {
    RUS_MONTHS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?")
}

/// "Май 2024" style label for the month of `date`.
pub fn month_label<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    format!("{} {}", month_name(date.month()), date.year())
}

/// How log files are split over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rollover {
    #[default]
    Daily,
    Monthly,
}

impl Rollover {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "daily" | "day" => Some(Rollover::Daily),
            "monthly" | "month" => Some(Rollover::Monthly),
            _ => None,
        }
    }

    /// Base file name (without extension) for a local date.
    pub fn file_stem(&self, date: NaiveDate) -> String {
        match self {
            Rollover::Daily => format!(
                "{}-{}-{}",
                date.year(),
                month_name(date.month()),
                date.day()
            ),
            Rollover::Monthly => format!("{}-{}", date.year(), month_name(date.month())),
        }
    }
}

/// Parse "+03:00", "-05:30", "+3" or "UTC" into a fixed offset.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => (1, value),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };

    let hours: i32 = hours
        .parse()
        .map_err(|_| Error::ConfigError(format!("invalid UTC offset: {}", value)))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| Error::ConfigError(format!("invalid UTC offset: {}", value)))?;

    if hours > 14 || minutes > 59 {
        return Err(Error::ConfigError(format!("invalid UTC offset: {}", value)));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| Error::ConfigError(format!("invalid UTC offset: {}", value)))
}

/// Time zone of every local timestamp: an IANA zone (with DST) or a fixed
/// UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    /// "Europe/Kyiv" style names first, then offsets like "+03:00".
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if let Ok(tz) = value.parse::<Tz>() {
            return Ok(Zone::Named(tz));
        }
        parse_utc_offset(value).map(Zone::Fixed).map_err(|_| {
            Error::ConfigError(format!(
                "unknown time zone '{}', expected an IANA name or a UTC offset",
                value
            ))
        })
    }

    fn at(&self, fixed: FixedOffset) -> ZoneOffset {
        ZoneOffset { zone: *self, fixed }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Named(tz) => f.write_str(tz.name()),
            Zone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

/// Offset of a [`Zone`] at a particular instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneOffset {
    zone: Zone,
    fixed: FixedOffset,
}

impl Offset for ZoneOffset {
    fn fix(&self) -> FixedOffset {
        self.fixed
    }
}

impl fmt::Display for ZoneOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fixed)
    }
}

impl TimeZone for Zone {
    type Offset = ZoneOffset;

    fn from_offset(offset: &ZoneOffset) -> Self {
        offset.zone
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> MappedLocalTime<ZoneOffset> {
        self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> MappedLocalTime<ZoneOffset> {
        match self {
            Zone::Named(tz) => tz
                .offset_from_local_datetime(local)
                .map(|offset| self.at(offset.fix())),
            Zone::Fixed(fixed) => MappedLocalTime::Single(self.at(*fixed)),
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> ZoneOffset {
        self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> ZoneOffset {
        match self {
            Zone::Named(tz) => self.at(tz.offset_from_utc_datetime(utc).fix()),
            Zone::Fixed(fixed) => self.at(*fixed),
        }
    }
}

/// The zone used when nothing is configured.
pub fn default_zone() -> Zone {
    Zone::Named(chrono_tz::Europe::Moscow)
}

/// Current time in the configured zone.
pub fn now_local(tz: &Zone) -> DateTime<Zone> {
    Utc::now().with_timezone(tz)
}

/// Build a zoned timestamp, rejecting impossible calendar values.
pub fn local_datetime(
    tz: &Zone,
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Zone>> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid date {:04}-{:02}-{:02} {:02}:{:02}",
                year, month, day, hour, minute
            ))
        })?;

    // The earlier instant wins when clocks go back.
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::InvalidArgument(format!("local time {} does not exist", naive)))
}

/// Parse a user supplied timestamp in the configured zone.
///
/// Accepts `YYYY-MM-DD HH:MM`, `DD.MM.YYYY HH:MM` and the date-only forms
/// of both (midnight).
pub fn parse_local(tz: &Zone, value: &str) -> Result<DateTime<Zone>> {
    let value = value.trim();
    let with_time = ["%Y-%m-%d %H:%M", "%d.%m.%Y %H:%M", "%Y-%m-%dT%H:%M"];
    for fmt in with_time {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, fmt) {
            if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
                return Ok(dt);
            }
        }
    }

    for fmt in ["%Y-%m-%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return local_datetime(tz, date.year(), date.month(), date.day(), 0, 0);
        }
    }

    Err(Error::InvalidArgument(format!(
        "cannot parse date '{}', expected YYYY-MM-DD [HH:MM] or DD.MM.YYYY [HH:MM]",
        value
    )))
}
