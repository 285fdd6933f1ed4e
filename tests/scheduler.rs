//! Integration tests for `src/scheduler.rs`.

#[path = "scheduler/timing_test.rs"]
mod timing_test;
