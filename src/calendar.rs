//! Test-drive calendar booking.
//!
//! Turns a customer's fuzzy date/time preferences into a concrete
//! appointment: a parsed datetime, a Google-Calendar TEMPLATE link the
//! salesperson can click, and a lead update marking the appointment booked.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;

use crate::types::LeadStatus;

/// Event length for a test drive.
const EVENT_DURATION_HOURS: u64 = 1;

/// Fallback appointment time when parsing fails: 14:00.
const DEFAULT_HOUR: u32 = 14;

/// A completed booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDriveBooking {
    /// Google-Calendar TEMPLATE link for the event.
    pub calendar_url: String,
    /// Parsed local appointment datetime.
    pub appointment_datetime: NaiveDateTime,
    /// Status the lead should move to.
    pub lead_status: LeadStatus,
}

/// Build a booking from customer details and fuzzy date/time preferences.
///
/// `today` anchors relative phrases ("today", "tomorrow", "next week").
pub fn schedule_test_drive(
    customer_name: &str,
    customer_phone: &str,
    vehicle: &str,
    preferred_date: &str,
    preferred_time: &str,
    today: NaiveDate,
) -> TestDriveBooking {
    let appointment_datetime = parse_appointment_datetime(preferred_date, preferred_time, today);
    let calendar_url =
        build_calendar_url(customer_name, customer_phone, vehicle, appointment_datetime);
    TestDriveBooking {
        calendar_url,
        appointment_datetime,
        lead_status: LeadStatus::AppointmentBooked,
    }
}

/// Combine fuzzy date and time into a datetime, defaulting to tomorrow 14:00
/// when either part fails to parse.
pub fn parse_appointment_datetime(
    preferred_date: &str,
    preferred_time: &str,
    today: NaiveDate,
) -> NaiveDateTime {
    let date = parse_date(preferred_date, today)
        .unwrap_or_else(|| tomorrow(today));
    let time = parse_time(preferred_time)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).unwrap_or_default());
    date.and_time(time)
}

fn tomorrow(today: NaiveDate) -> NaiveDate {
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

/// Parse a fuzzy date phrase.
///
/// Accepts: "today", "tomorrow", "next week", `MM/DD`, `MM/DD/YYYY`,
/// and month-abbreviation forms like "Dec 15".
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    match trimmed.to_lowercase().as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(tomorrow(today)),
        "next week" => return today.checked_add_days(Days::new(7)),
        _ => {}
    }

    if trimmed.contains('/') {
        return parse_slash_date(trimmed, today);
    }
    parse_text_date(trimmed, today)
}

/// Parse `MM/DD` or `MM/DD/YYYY`.
fn parse_slash_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.split('/').collect();
    match parts.as_slice() {
        [month, day] => {
            let month: u32 = month.parse().ok()?;
            let day: u32 = day.parse().ok()?;
            NaiveDate::from_ymd_opt(today.year(), month, day)
        }
        [month, day, year] => {
            let month: u32 = month.parse().ok()?;
            let day: u32 = day.parse().ok()?;
            let year: i32 = year.parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

/// Parse month-abbreviation dates like "Dec 15".
fn parse_text_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{raw} {}", today.year()), "%b %d %Y").ok()
}

/// Parse a time-of-day phrase.
///
/// Accepts 12-hour forms with am/pm ("2pm", "2:30pm", "12am"), and 24-hour
/// forms ("14:00", bare "2" meaning 02:00).
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let cleaned = raw.trim().to_lowercase().replace(' ', "");
    if cleaned.is_empty() {
        return None;
    }

    if let Some(body) = cleaned.strip_suffix("pm") {
        let (hour, minute) = split_hour_minute(body)?;
        let hour = if hour == 12 { 12 } else { hour.checked_add(12)? };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(body) = cleaned.strip_suffix("am") {
        let (hour, minute) = split_hour_minute(body)?;
        let hour = if hour == 12 { 0 } else { hour };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if cleaned == "noon" {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }

    let (hour, minute) = split_hour_minute(&cleaned)?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn split_hour_minute(body: &str) -> Option<(u32, u32)> {
    if let Some((h, m)) = body.split_once(':') {
        Some((h.parse().ok()?, m.parse().ok()?))
    } else {
        Some((body.parse().ok()?, 0))
    }
}

/// Build the Google-Calendar TEMPLATE link for a one-hour event.
fn build_calendar_url(
    customer_name: &str,
    customer_phone: &str,
    vehicle: &str,
    start: NaiveDateTime,
) -> String {
    let end = start
        .checked_add_signed(chrono::Duration::hours(
            i64::try_from(EVENT_DURATION_HOURS).unwrap_or(1),
        ))
        .unwrap_or(start);

    let title = format!("Test Drive: {customer_name} - {vehicle}");
    let details = format!(
        "Test drive appointment for {customer_name}\n\nVehicle: {vehicle}\nCustomer Phone: {customer_phone}"
    );
    let dates = format!(
        "{}/{}",
        start.format("%Y%m%dT%H%M%S"),
        end.format("%Y%m%dT%H%M%S")
    );

    let mut url = match Url::parse("https://calendar.google.com/calendar/render") {
        Ok(u) => u,
        Err(_) => return String::new(),
    };
    url.query_pairs_mut()
        .append_pair("action", "TEMPLATE")
        .append_pair("text", &title)
        .append_pair("dates", &dates)
        .append_pair("details", &details);
    url.to_string()
}
