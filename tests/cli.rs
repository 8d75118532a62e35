use assert_cmd::prelude::*;
use chargeguard_core_types::clock::system_clock;
use chargeguard_core_types::Secret;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::Command;
use webhook_verifier::{HmacAlgorithm, SignatureScheme, WebhookVerifier};

const PAYPAL_SECRET: &str = "paypal-webhook-secret";

fn chargeguard() -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("chargeguard");
    let mut cmd = Command::new(bin);
    cmd.env_remove("CHARGEGUARD_CONFIG")
        .env_remove("STRIPE_API_BASE_URL")
        .env_remove("PAYPAL_API_BASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(stdout.trim()).expect("valid json")
}

fn write_settings(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("gateway.toml");
    fs::write(
        &path,
        format!(
            r#"
[portals.paypal]
client_id = "cli-client"
client_secret = "cli-secret"
webhook_secret = "{PAYPAL_SECRET}"

[portals.stripe]
api_key = "sk_test_cli"
base_url = "http://127.0.0.1:9"
"#
        ),
    )
    .unwrap();
    path
}

#[test]
fn classify_reason_uses_network_tables() {
    let assert = chargeguard()
        .args(["classify-reason", "--portal", "stripe", "--brand", "visa", "10.4"])
        .assert()
        .success();
    let mapping = stdout_json(assert.get_output());
    assert_eq!(mapping["code"], "10.4");
    assert_eq!(mapping["category"], "FRAUD");
    assert_eq!(mapping["source"], "network_table");
    assert_eq!(mapping["description"], "Other Fraud - Card-Absent Environment");
}

#[test]
fn classify_reason_prefers_portal_table() {
    let assert = chargeguard()
        .args(["classify-reason", "--portal", "paypal", "MERCHANDISE_OR_SERVICE_NOT_RECEIVED"])
        .assert()
        .success();
    let mapping = stdout_json(assert.get_output());
    assert_eq!(mapping["category"], "CONSUMER_DISPUTE");
    assert_eq!(mapping["source"], "table");
}

#[test]
fn unknown_portal_is_rejected_by_the_parser() {
    chargeguard()
        .args(["classify-reason", "--portal", "venmo", "10.4"])
        .assert()
        .failure();
}

#[test]
fn idempotency_keys_carry_prefix_and_portal() {
    let first = chargeguard()
        .args(["idempotency-key", "--portal", "authorize-net", "--prefix", "evidence"])
        .assert()
        .success();
    let second = chargeguard()
        .args(["idempotency-key", "--portal", "authorize-net", "--prefix", "evidence"])
        .assert()
        .success();
    let first = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let second = String::from_utf8(second.get_output().stdout.clone()).unwrap();
    assert!(first.trim().starts_with("evidence_authorize_net_"));
    assert_ne!(first.trim(), second.trim());
}

#[test]
fn verify_webhook_prints_the_parsed_event() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_settings(dir.path());
    let body = r#"{"id":"WH-7","event_type":"CUSTOMER.DISPUTE.UPDATED","create_time":"2024-03-01T12:00:00Z","resource":{"dispute_id":"PP-D-7","dispute_amount":{"value":"12.00","currency_code":"USD"},"reason":"UNAUTHORISED","status":"UNDER_REVIEW","create_time":"2024-02-28T09:00:00Z"}}"#;
    let signer = WebhookVerifier::new(
        SignatureScheme::raw_hex("paypal-transmission-sig", HmacAlgorithm::Sha256),
        Some(Secret::new(PAYPAL_SECRET)),
        system_clock(),
    );
    let body_path = dir.path().join("body.json");
    fs::write(&body_path, body).unwrap();
    let headers_path = dir.path().join("headers.json");
    fs::write(
        &headers_path,
        json!({ "PayPal-Transmission-Sig": signer.sign(body.as_bytes()).unwrap() }).to_string(),
    )
    .unwrap();

    let assert = chargeguard()
        .arg("--config")
        .arg(&settings)
        .args(["verify-webhook", "--portal", "paypal", "--headers"])
        .arg(&headers_path)
        .arg("--body")
        .arg(&body_path)
        .assert()
        .success();
    let event = stdout_json(assert.get_output());
    let printed = event.to_string();
    assert!(printed.contains("PP-D-7"));
    assert!(printed.contains("CUSTOMER.DISPUTE.UPDATED"));

    fs::write(&body_path, body.replace("12.00", "1200.00")).unwrap();
    chargeguard()
        .arg("--config")
        .arg(&settings)
        .args(["verify-webhook", "--portal", "paypal", "--headers"])
        .arg(&headers_path)
        .arg("--body")
        .arg(&body_path)
        .assert()
        .failure();
}

#[test]
fn health_reports_unreachable_portal_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_settings(dir.path());
    let assert = chargeguard()
        .arg("--config")
        .arg(&settings)
        .args(["health", "--portal", "stripe"])
        .assert()
        .success();
    let reports = stdout_json(assert.get_output());
    assert_eq!(reports["stripe"]["healthy"], false);
}

#[test]
fn health_for_unconfigured_portal_fails() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_settings(dir.path());
    chargeguard()
        .arg("--config")
        .arg(&settings)
        .args(["health", "--portal", "verifi"])
        .assert()
        .failure();
}
