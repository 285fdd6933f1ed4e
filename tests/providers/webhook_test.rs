//! Webhook verification and payload normalization through the provider
//! trait, the way the webhook route exercises it.

use axum::http::{HeaderMap, HeaderValue};
use hmac::{Hmac, Mac};
use lotline::config::ProviderCredentials;
use lotline::providers::{telnyx::TelnyxProvider, vonage::VonageProvider, MessagingProvider};
use sha2::Sha256;

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("key ok");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn secured(secret: &str) -> ProviderCredentials {
    ProviderCredentials {
        webhook_secret: Some(secret.to_owned()),
        ..ProviderCredentials::default()
    }
}

fn telnyx_body() -> String {
    r#"{"data": {"event_type": "message.received", "payload": {
        "id": "msg-77",
        "from": {"phone_number": "5551230001"},
        "to": [{"phone_number": "(555) 999-0000"}],
        "text": "looking for a 2021 camry",
        "received_at": "2025-06-02T14:30:00Z"
    }}}"#
        .to_owned()
}

#[test]
fn signed_telnyx_webhook_verifies_and_parses() {
    let provider = TelnyxProvider::new(secured("shh"), None);
    let body = telnyx_body();

    let mut headers = HeaderMap::new();
    headers.insert(
        "telnyx-signature",
        HeaderValue::from_str(&sign("shh", body.as_bytes())).expect("ascii"),
    );

    assert!(provider.verify(&headers, body.as_bytes()));
    let inbound = provider.parse(&body, "application/json").expect("parses");
    // Both numbers come out E.164-normalized.
    assert_eq!(inbound.from_phone, "+15551230001");
    assert_eq!(inbound.to_phone, "+15559990000");
    assert_eq!(inbound.provider_name, "telnyx");
}

#[test]
fn tampered_body_fails_verification() {
    let provider = TelnyxProvider::new(secured("shh"), None);
    let body = telnyx_body();
    let mut headers = HeaderMap::new();
    headers.insert(
        "telnyx-signature",
        HeaderValue::from_str(&sign("shh", body.as_bytes())).expect("ascii"),
    );

    let tampered = body.replace("camry", "lambo");
    assert!(!provider.verify(&headers, tampered.as_bytes()));
}

#[test]
fn wrong_header_name_fails_closed() {
    let provider = TelnyxProvider::new(secured("shh"), None);
    let body = telnyx_body();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-some-other-signature",
        HeaderValue::from_str(&sign("shh", body.as_bytes())).expect("ascii"),
    );
    assert!(!provider.verify(&headers, body.as_bytes()));
}

#[test]
fn missing_secret_skips_verification_in_dev() {
    let provider = TelnyxProvider::new(ProviderCredentials::default(), None);
    assert!(provider.verify(&HeaderMap::new(), b"anything"));
}

#[test]
fn vonage_form_and_json_payloads_normalize_identically() {
    let provider = VonageProvider::new(secured("shh"), None);

    let form = "msisdn=5551230001&to=5559990000&text=hello&messageId=m1&type=text";
    let json = r#"{"msisdn": "5551230001", "to": "5559990000", "text": "hello", "messageId": "m1", "type": "text"}"#;

    let from_form = provider
        .parse(form, "application/x-www-form-urlencoded")
        .expect("form parses");
    let from_json = provider.parse(json, "application/json").expect("json parses");

    assert_eq!(from_form.from_phone, from_json.from_phone);
    assert_eq!(from_form.to_phone, from_json.to_phone);
    assert_eq!(from_form.text, from_json.text);
    assert_eq!(from_form.provider_message_id, from_json.provider_message_id);
}

#[test]
fn delivery_receipts_and_media_are_dropped() {
    let telnyx = TelnyxProvider::new(ProviderCredentials::default(), None);
    let receipt = r#"{"data": {"event_type": "message.finalized", "payload": {
        "from": {"phone_number": "5551230001"},
        "to": [{"phone_number": "5559990000"}],
        "text": "x"
    }}}"#;
    assert!(telnyx.parse(receipt, "application/json").is_none());

    let vonage = VonageProvider::new(ProviderCredentials::default(), None);
    let binary = r#"{"msisdn": "5551230001", "to": "5559990000", "text": "x", "type": "binary"}"#;
    assert!(vonage.parse(binary, "application/json").is_none());
}
