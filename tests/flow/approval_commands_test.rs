//! Approval command interpretation: the YES / NO / EDIT / FORCE contract.

use lotline::flow::{interpret_approval_command, ApprovalCommand};

#[test]
fn every_documented_yes_synonym_approves() {
    let synonyms = [
        "YES",
        "y",
        "send",
        "approve",
        "ok",
        "okay",
        "👍",
        "✅",
        "send it",
        "looks good",
        "good",
        "go ahead",
        "approve it",
    ];
    for synonym in synonyms {
        assert_eq!(
            interpret_approval_command(synonym),
            ApprovalCommand::Approve,
            "{synonym:?} must approve"
        );
    }
}

#[test]
fn every_documented_no_synonym_rejects() {
    let synonyms = ["NO", "n", "reject", "cancel", "skip", "👎", "❌", "don't send", "reject it"];
    for synonym in synonyms {
        assert_eq!(
            interpret_approval_command(synonym),
            ApprovalCommand::Reject,
            "{synonym:?} must reject"
        );
    }
}

#[test]
fn case_and_whitespace_are_ignored() {
    assert_eq!(interpret_approval_command("  Yes  "), ApprovalCommand::Approve);
    assert_eq!(interpret_approval_command("LOOKS GOOD"), ApprovalCommand::Approve);
    assert_eq!(interpret_approval_command("No Thanks"), ApprovalCommand::Reject);
}

#[test]
fn edit_extracts_instructions_verbatim() {
    let command = interpret_approval_command("EDIT mention 0% APR and be friendlier");
    assert_eq!(
        command,
        ApprovalCommand::Edit("mention 0% APR and be friendlier".to_owned())
    );
}

#[test]
fn edit_without_instructions_is_empty_edit() {
    assert_eq!(interpret_approval_command("EDIT"), ApprovalCommand::Edit(String::new()));
    assert_eq!(interpret_approval_command("edit   "), ApprovalCommand::Edit(String::new()));
}

#[test]
fn force_extracts_custom_message_verbatim() {
    let command = interpret_approval_command("FORCE Hi John, calling you in 5.");
    assert_eq!(
        command,
        ApprovalCommand::Force("Hi John, calling you in 5.".to_owned())
    );
}

#[test]
fn force_without_message_is_empty_force() {
    assert_eq!(interpret_approval_command("FORCE"), ApprovalCommand::Force(String::new()));
}

#[test]
fn free_text_is_unknown_and_gets_help() {
    for text in ["maybe later", "who is this", "🤷", "YES PLEASE DO IT NOW"] {
        assert_eq!(
            interpret_approval_command(text),
            ApprovalCommand::Unknown,
            "{text:?} must be unknown"
        );
    }
}
