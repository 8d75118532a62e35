//! Layered adapter settings: defaults, an optional file, `CHARGEGUARD__*`
//! environment variables, then the per-portal `<PORTAL>_API_BASE_URL`
//! overrides applied when an adapter is built.

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chargeguard_core_types::{PortalError, PortalKind, PortalResult, Secret};
use config::{Config, Environment, File};
use portal_net::retry::DEFAULT_RETRYABLE_STATUSES;
use portal_net::RetryPolicy;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

pub const CONFIG_PATH_ENV: &str = "CHARGEGUARD_CONFIG";
pub const ENV_PREFIX: &str = "CHARGEGUARD";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub portals: PortalSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long identical mutations are answered from the receipt cache;
    /// zero disables it.
    #[serde(default = "default_receipt_ttl_secs")]
    pub receipt_ttl_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            receipt_ttl_secs: default_receipt_ttl_secs(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn receipt_ttl(&self) -> Duration {
        Duration::from_secs(self.receipt_ttl_secs)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_receipt_ttl_secs() -> u64 {
    600
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            retryable_statuses: self.retryable_statuses.iter().copied().collect::<BTreeSet<_>>(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_jitter_ms() -> u64 {
    500
}

fn default_retryable_statuses() -> Vec<u16> {
    DEFAULT_RETRYABLE_STATUSES.to_vec()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PortalSettings {
    pub stripe: Option<StripeSettings>,
    pub paypal: Option<PaypalSettings>,
    pub mastercom: Option<MastercomSettings>,
    pub authorize_net: Option<AuthorizeNetSettings>,
    pub square: Option<SquareSettings>,
    pub verifi: Option<VerifiSettings>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeSettings {
    pub api_key: Secret,
    #[serde(default)]
    pub webhook_secret: Option<Secret>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaypalSettings {
    pub client_id: String,
    pub client_secret: Secret,
    #[serde(default)]
    pub webhook_secret: Option<Secret>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MastercomSettings {
    pub consumer_key: String,
    /// PEM private key for `RSA-SHA256`; the shared secret for the HMAC methods.
    pub signing_key: Secret,
    /// `RSA-SHA256` (default), `HMAC-SHA256` or `HMAC-SHA512`.
    #[serde(default)]
    pub signature_method: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthorizeNetSettings {
    pub api_login_id: Secret,
    pub transaction_key: Secret,
    #[serde(default)]
    pub signature_key: Option<Secret>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SquareSettings {
    pub access_token: Secret,
    #[serde(default = "default_square_version")]
    pub square_version: String,
    #[serde(default)]
    pub signature_key: Option<Secret>,
    #[serde(default)]
    pub notification_url: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_square_version() -> String {
    "2024-01-18".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct VerifiSettings {
    pub client_id: String,
    pub client_secret: Secret,
    pub merchant_id: String,
    #[serde(default)]
    pub webhook_secret: Option<Secret>,
    #[serde(default = "default_true")]
    pub risk_scoring: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl GatewaySettings {
    /// Loads settings from `path`, else `$CHARGEGUARD_CONFIG` when set, then
    /// layers `CHARGEGUARD__SECTION__KEY` environment variables on top.
    pub fn load(path: Option<&Path>) -> PortalResult<Self> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut builder = Config::builder()
            .set_default("http.timeout_ms", default_timeout_ms())
            .map_err(config_error)?
            .set_default("retry.max_retries", default_max_retries())
            .map_err(config_error)?;

        if let Some(path) = &path {
            if !path.exists() {
                return Err(PortalError::Configuration(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            info!(path = %path.display(), "loading gateway settings");
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: GatewaySettings = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;
        debug!(
            timeout_ms = settings.http.timeout_ms,
            max_retries = settings.retry.max_retries,
            portals = ?settings.configured_portals(),
            "gateway settings resolved"
        );
        Ok(settings)
    }

    pub fn configured_portals(&self) -> Vec<PortalKind> {
        let p = &self.portals;
        PortalKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                PortalKind::Stripe => p.stripe.is_some(),
                PortalKind::Paypal => p.paypal.is_some(),
                PortalKind::Mastercom => p.mastercom.is_some(),
                PortalKind::AuthorizeNet => p.authorize_net.is_some(),
                PortalKind::Square => p.square.is_some(),
                PortalKind::Verifi => p.verifi.is_some(),
            })
            .collect()
    }
}

/// `<PORTAL>_API_BASE_URL` beats the configured URL, which beats the
/// portal's production default.
pub fn resolve_base_url(kind: PortalKind, configured: Option<&str>) -> PortalResult<Url> {
    let from_env = env::var(kind.base_url_env())
        .ok()
        .filter(|value| !value.trim().is_empty());
    let chosen = from_env
        .as_deref()
        .or(configured)
        .unwrap_or_else(|| kind.default_base_url());
    Url::parse(chosen.trim()).map_err(|err| {
        PortalError::Configuration(format!("invalid base url for {kind}: {chosen}: {err}"))
    })
}

fn config_error(err: config::ConfigError) -> PortalError {
    PortalError::Configuration(err.to_string())
}
