//! Boundary behavior for date/time parsing and booking assembly.

use chrono::{NaiveDate, NaiveTime};
use lotline::calendar::{parse_appointment_datetime, parse_time, schedule_test_drive};
use lotline::types::LeadStatus;

fn anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date")
}

#[test]
fn noon_and_midnight_boundaries() {
    assert_eq!(parse_time("12pm"), NaiveTime::from_hms_opt(12, 0, 0));
    assert_eq!(parse_time("12am"), NaiveTime::from_hms_opt(0, 0, 0));
    assert_eq!(parse_time("12:30am"), NaiveTime::from_hms_opt(0, 30, 0));
}

#[test]
fn bare_number_reads_as_24_hour() {
    assert_eq!(parse_time("2"), NaiveTime::from_hms_opt(2, 0, 0));
    assert_eq!(parse_time("14"), NaiveTime::from_hms_opt(14, 0, 0));
}

#[test]
fn nonsense_defaults_to_tomorrow_fourteen_hundred() {
    let dt = parse_appointment_datetime("whenever works", "late-ish", anchor());
    assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 6, 3).expect("valid"));
    assert_eq!(dt.time(), NaiveTime::from_hms_opt(14, 0, 0).expect("valid"));
}

#[test]
fn booking_moves_lead_to_appointment_booked() {
    let booking = schedule_test_drive(
        "Sarah Johnson",
        "+15551234567",
        "2020 Toyota Camry",
        "tomorrow",
        "2pm",
        anchor(),
    );
    assert_eq!(booking.lead_status, LeadStatus::AppointmentBooked);
    assert_eq!(
        booking.appointment_datetime,
        NaiveDate::from_ymd_opt(2025, 6, 3)
            .expect("valid")
            .and_hms_opt(14, 0, 0)
            .expect("valid")
    );
}

#[test]
fn booking_url_is_google_template_with_one_hour_window() {
    let booking = schedule_test_drive("A", "+1555", "Camry", "12/15", "10am", anchor());
    assert!(booking.calendar_url.starts_with("https://calendar.google.com/calendar/render"));
    assert!(booking.calendar_url.contains("action=TEMPLATE"));
    assert!(booking.calendar_url.contains("20251215T100000%2F20251215T110000"));
    assert!(booking.calendar_url.contains("Test+Drive"));
}
