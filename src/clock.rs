use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{ConciergeBotError, Result};

/// Canonical civil-time encoding used for every persisted timestamp.
/// No zone suffix; always interpreted in the one configured offset.
const CIVIL_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const SHORT_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// iCalendar basic UTC form (`20240501T013000Z`).
const UTC_BASIC_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Wall clock pinned to a single fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct CivilClock {
    offset: UtcOffset,
}

impl CivilClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn from_offset_hours(hours: i8) -> Result<Self> {
        let offset = UtcOffset::from_hms(hours, 0, 0)
            .map_err(|e| ConciergeBotError::Config(e.to_string()))?;
        Ok(Self { offset })
    }

    /// Current civil time in the configured offset, zone dropped.
    pub fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        PrimitiveDateTime::new(now.date(), now.time())
    }

    pub fn now_string(&self) -> String {
        format_civil(self.now())
    }

    /// Re-attaches the configured offset to a stored civil time and converts
    /// to UTC.
    pub fn to_utc(&self, civil: PrimitiveDateTime) -> OffsetDateTime {
        civil.assume_offset(self.offset).to_offset(UtcOffset::UTC)
    }
}

pub fn format_utc_basic(value: OffsetDateTime) -> String {
    value
        .format(UTC_BASIC_FORMAT)
        .unwrap_or_else(|_| String::new())
}

pub fn parse_civil(value: &str) -> Result<PrimitiveDateTime> {
    PrimitiveDateTime::parse(value, CIVIL_FORMAT)
        .map_err(|e| ConciergeBotError::Runtime(format!("unparseable datetime '{value}': {e}")))
}

pub fn format_civil(value: PrimitiveDateTime) -> String {
    value
        .format(CIVIL_FORMAT)
        .unwrap_or_else(|_| String::new())
}

/// Minute-precision rendering for user-facing messages.
pub fn format_short(value: PrimitiveDateTime) -> String {
    value
        .format(SHORT_FORMAT)
        .unwrap_or_else(|_| String::new())
}

/// Normalizes a datetime-picker value to the canonical encoding: the `T`
/// separator becomes a space and missing seconds become `:00`. The result is
/// parsed before it is accepted, so only valid canonical strings come out.
pub fn normalize_datetime(raw: &str) -> Result<String> {
    let mut value = raw.trim().replace('T', " ");
    if value.len() == "0000-00-00 00:00".len() {
        value.push_str(":00");
    }
    parse_civil(&value)?;
    Ok(value)
}

/// Moment at which a schedule's reminder window opens.
pub fn lead_window_start(scheduled: PrimitiveDateTime, lead_minutes: i64) -> PrimitiveDateTime {
    scheduled - Duration::minutes(lead_minutes)
}
