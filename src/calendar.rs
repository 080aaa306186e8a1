use time::{Duration, OffsetDateTime};

use crate::clock::{self, CivilClock};
use crate::error::Result;
use crate::store::ScheduleItem;

/// Exported events span one hour from the scheduled moment.
const EVENT_DURATION: Duration = Duration::hours(1);

/// Renders a schedule as a single-event iCalendar document. Times are
/// converted from the stored civil encoding to UTC.
pub fn ics_document(schedule: &ScheduleItem, clock: &CivilClock) -> Result<String> {
    let start = clock::parse_civil(&schedule.scheduled_time)?;
    let start_utc = clock.to_utc(start);
    let end_utc = clock.to_utc(start + EVENT_DURATION);
    let stamp = clock::format_utc_basic(OffsetDateTime::now_utc());

    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Concierge Bot//Calendar Event//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("DTSTART:{}", clock::format_utc_basic(start_utc)),
        format!("DTEND:{}", clock::format_utc_basic(end_utc)),
        format!("DTSTAMP:{stamp}"),
        format!("UID:{}@concierge-bot", schedule.id),
        format!("SUMMARY:{}", escape_text(&schedule.title)),
        format!("DESCRIPTION:{}", escape_text(&schedule.description)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];
    Ok(lines.join("\r\n"))
}

/// Prefilled Google Calendar event link; dates are given in UTC so no
/// timezone name is needed.
pub fn google_calendar_url(schedule: &ScheduleItem, clock: &CivilClock) -> Result<String> {
    let start = clock::parse_civil(&schedule.scheduled_time)?;
    let start_utc = clock::format_utc_basic(clock.to_utc(start));
    let end_utc = clock::format_utc_basic(clock.to_utc(start + EVENT_DURATION));
    Ok(format!(
        "https://calendar.google.com/calendar/render?action=TEMPLATE&text={}&details={}&dates={}/{}",
        urlencoding::encode(&schedule.title),
        urlencoding::encode(&schedule.description),
        start_utc,
        end_utc,
    ))
}

/// Download path served by the daemon for one schedule's event file.
pub fn ics_download_path(id: i32) -> String {
    format!("/calendar_events/{id}.ics")
}

/// RFC 5545 text escaping for SUMMARY and DESCRIPTION values.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}
