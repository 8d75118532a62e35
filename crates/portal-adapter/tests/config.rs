use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chargeguard_core_types::{PortalError, PortalKind};
use portal_adapter::config::CONFIG_PATH_ENV;
use portal_adapter::{build_adapter, resolve_base_url, GatewaySettings};
use portal_net::ReqwestTransport;
use serial_test::serial;

const GATEWAY_TOML: &str = r#"
[http]
timeout_ms = 5000

[retry]
max_retries = 1
retryable_statuses = [503]

[portals.stripe]
api_key = "sk_test_file"
webhook_secret = "whsec_file"

[portals.square]
access_token = "sq-file-token"
signature_key = "sq-file-signature"
notification_url = "https://hooks.example/square"
"#;

fn clear_env() {
    for key in [
        CONFIG_PATH_ENV,
        "CHARGEGUARD__HTTP__TIMEOUT_MS",
        "CHARGEGUARD__RETRY__MAX_RETRIES",
        "STRIPE_API_BASE_URL",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_apply_without_file_or_env() {
    clear_env();
    let settings = GatewaySettings::load(None).unwrap();
    assert_eq!(settings.http.timeout(), Duration::from_secs(30));
    assert_eq!(settings.http.receipt_ttl(), Duration::from_secs(600));
    assert_eq!(settings.retry.max_retries, 3);
    assert!(settings.configured_portals().is_empty());

    let policy = settings.retry.to_policy();
    assert!(policy.retryable_statuses.contains(&503));
    assert!(!policy.retryable_statuses.contains(&400));
}

#[test]
#[serial]
fn file_sections_configure_portals() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.toml");
    fs::write(&path, GATEWAY_TOML).unwrap();

    let settings = GatewaySettings::load(Some(&path)).unwrap();
    assert_eq!(settings.http.timeout_ms, 5_000);
    assert_eq!(settings.retry.max_retries, 1);
    assert_eq!(settings.retry.retryable_statuses, vec![503]);
    assert_eq!(
        settings.configured_portals(),
        vec![PortalKind::Stripe, PortalKind::Square]
    );
    let stripe = settings.portals.stripe.as_ref().unwrap();
    assert_eq!(stripe.api_key.expose(), "sk_test_file");
    let square = settings.portals.square.as_ref().unwrap();
    assert_eq!(square.square_version, "2024-01-18");
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.toml");
    fs::write(&path, GATEWAY_TOML).unwrap();
    env::set_var(CONFIG_PATH_ENV, &path);
    env::set_var("CHARGEGUARD__HTTP__TIMEOUT_MS", "1500");
    env::set_var("CHARGEGUARD__RETRY__MAX_RETRIES", "0");

    let settings = GatewaySettings::load(None).unwrap();
    clear_env();
    assert_eq!(settings.http.timeout(), Duration::from_millis(1_500));
    assert_eq!(settings.retry.max_retries, 0);
    assert!(settings.portals.stripe.is_some());
}

#[test]
#[serial]
fn missing_config_file_is_a_configuration_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let err = GatewaySettings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, PortalError::Configuration(message) if message.contains("absent.toml")));
}

#[test]
#[serial]
fn base_url_prefers_environment_then_settings_then_default() {
    clear_env();
    assert_eq!(
        resolve_base_url(PortalKind::Stripe, None).unwrap().as_str(),
        "https://api.stripe.com/"
    );
    assert_eq!(
        resolve_base_url(PortalKind::Stripe, Some("https://stripe.internal"))
            .unwrap()
            .as_str(),
        "https://stripe.internal/"
    );
    env::set_var("STRIPE_API_BASE_URL", "http://127.0.0.1:12111");
    let overridden = resolve_base_url(PortalKind::Stripe, Some("https://stripe.internal"));
    env::remove_var("STRIPE_API_BASE_URL");
    assert_eq!(overridden.unwrap().as_str(), "http://127.0.0.1:12111/");

    let err = resolve_base_url(PortalKind::Stripe, Some("not a url")).unwrap_err();
    assert!(matches!(err, PortalError::Configuration(_)));
}

#[test]
#[serial]
fn building_an_unconfigured_portal_fails() {
    clear_env();
    let transport = Arc::new(ReqwestTransport::new().unwrap());
    let err = build_adapter(PortalKind::Verifi, &GatewaySettings::default(), transport).err();
    assert!(matches!(err, Some(PortalError::Configuration(message)) if message.contains("portals.verifi")));
}
