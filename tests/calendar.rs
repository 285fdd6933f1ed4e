//! Integration tests for `src/calendar.rs`.

#[path = "calendar/booking_test.rs"]
mod booking_test;
