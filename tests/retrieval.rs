//! Integration tests for `src/retrieval/`.

#[path = "retrieval/context_search_test.rs"]
mod context_search_test;
