//! Integration tests for `src/flow/`.

#[path = "flow/approval_commands_test.rs"]
mod approval_commands_test;
#[path = "flow/conversation_path_test.rs"]
mod conversation_path_test;
#[path = "flow/edit_validation_test.rs"]
mod edit_validation_test;
