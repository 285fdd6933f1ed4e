//! The EDIT loop's keyword-overlap validation.

use lotline::flow::validate_edit_requirements;

#[test]
fn financing_edit_accepts_financing_heavy_reply() {
    let response = "Great news - we're running a 0% APR financing promotion right now. \
                    Want me to have our finance team reach out with payment options?";
    assert!(validate_edit_requirements(response, "mention 0% APR and financing"));
}

#[test]
fn financing_edit_rejects_unrelated_reply() {
    let response = "The 2021 Camry has 32,000 miles and a clean history.";
    assert!(!validate_edit_requirements(response, "mention 0% APR and financing"));
}

#[test]
fn friendly_edit_wants_warm_markers() {
    let warm = "Thanks so much for reaching out! Happy to help - excited to find you \
                the right car. Warm welcome from all of us!";
    assert!(validate_edit_requirements(warm, "be more friendly"));

    let cold = "Vehicle available. Price $24,500.";
    assert!(!validate_edit_requirements(cold, "be more friendly"));
}

#[test]
fn combined_edit_covers_both_categories() {
    // Scenario: "EDIT mention 0% APR and be friendlier" — the regenerated
    // reply must carry both financing-promotion and friendly-tone markers.
    let response = "Thanks for asking! We're excited to offer a 0% APR financing \
                    promotion on the Camry right now. Happy to walk you through a \
                    payment that works.";
    assert!(validate_edit_requirements(
        response,
        "mention 0% APR and be friendlier"
    ));
}

#[test]
fn generic_instructions_use_word_overlap() {
    assert!(validate_edit_requirements(
        "I'll confirm the warranty coverage details for you today.",
        "confirm warranty coverage"
    ));
    assert!(!validate_edit_requirements(
        "See you Saturday!",
        "confirm warranty coverage"
    ));
}

#[test]
fn short_instructions_never_block_the_flow() {
    // Nothing extractable to check: the validator must not wedge the loop.
    assert!(validate_edit_requirements("any reply at all", "do it"));
}
