//! Integration tests for `src/providers/`.

#[path = "providers/webhook_test.rs"]
mod webhook_test;
