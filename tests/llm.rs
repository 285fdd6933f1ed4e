//! Integration tests for `src/llm/`.

#[path = "llm/reply_contract_test.rs"]
mod reply_contract_test;
