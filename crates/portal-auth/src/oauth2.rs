use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chargeguard_core_types::{Clock, PortalError, PortalResult, Secret};
use chrono::{DateTime, Utc};
use http::header::{ACCEPT, AUTHORIZATION};
use http::HeaderValue;
use parking_lot::RwLock;
use portal_net::{send_with_timeout, Body, HttpTransport, NetRequest};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::strategy::{AuthScheme, AuthStrategy};

/// Lower bound on how early a token is treated as expired.
pub const MIN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_EXPIRES_IN: u64 = 3_600;
/// Upper bound on a token lifetime; longer or overflowing values are clamped.
pub const MAX_EXPIRES_IN: u64 = 86_400 * 365;

/// How the token endpoint expects the client to prove itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenRequestAuth {
    /// `Authorization: Basic base64(client_id:client_secret)` with a
    /// `grant_type=client_credentials` form body.
    Basic,
    /// JSON body carrying a random nonce, a timestamp and
    /// `base64(sha256(nonce + created + secret))` in place of the secret.
    NonceDigest,
}

#[derive(Clone, Debug)]
pub struct OAuth2Credential {
    pub client_id: String,
    pub client_secret: Secret,
    pub token_url: Url,
    pub scope: Option<String>,
    pub token_auth: TokenRequestAuth,
}

/// Cached bearer token. `expires_at` already has the refresh margin applied.
#[derive(Clone, Debug)]
pub struct SessionToken {
    pub value: Secret,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials grant with a cached, lazily refreshed token.
///
/// Readers take the `session` lock only long enough to clone the token.
/// Refreshes are serialized by `refresh_gate`; whoever wins the gate re-checks
/// the session so callers that queued behind a refresh reuse its result.
pub struct OAuth2ClientCredentials {
    credential: OAuth2Credential,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    refresh_margin: chrono::Duration,
    timeout: Duration,
    session: RwLock<Option<SessionToken>>,
    refresh_gate: Mutex<()>,
}

impl OAuth2ClientCredentials {
    pub fn new(
        credential: OAuth2Credential,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> PortalResult<Self> {
        if credential.client_id.is_empty() || credential.client_secret.is_empty() {
            return Err(PortalError::Configuration(
                "oauth2 client id and secret are required".into(),
            ));
        }
        Ok(Self {
            credential,
            transport,
            clock,
            refresh_margin: margin(MIN_REFRESH_MARGIN),
            timeout: Duration::from_secs(30),
            session: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        })
    }

    /// Margins below [`MIN_REFRESH_MARGIN`] are raised to it.
    pub fn with_refresh_margin(mut self, refresh_margin: Duration) -> Self {
        self.refresh_margin = margin(refresh_margin.max(MIN_REFRESH_MARGIN));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_token(&self) -> Option<SessionToken> {
        self.session.read().clone()
    }

    fn usable_token(&self) -> Option<SessionToken> {
        let now = self.clock.now();
        self.session
            .read()
            .as_ref()
            .filter(|token| token.is_usable_at(now))
            .cloned()
    }

    async fn refresh(&self) -> PortalResult<SessionToken> {
        let request = self.token_request()?;
        let response = send_with_timeout(self.transport.as_ref(), request, self.timeout)
            .await
            .map_err(|err| match err {
                err if err.is_transport_failure() => err,
                PortalError::TransientNetwork { status, message } => PortalError::Authentication {
                    status,
                    message: format!("token endpoint unavailable: {message}"),
                },
                other => PortalError::Authentication {
                    status: other.status(),
                    message: format!("token request rejected: {other}"),
                },
            })?;

        let parsed: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|err| PortalError::authentication(format!("unreadable token response: {err}")))?;
        if parsed.access_token.is_empty() {
            return Err(PortalError::authentication("token response had no access_token"));
        }
        let expires_in = parsed.expires_in.unwrap_or_else(|| {
            warn!(
                token_url = %self.credential.token_url,
                default_secs = DEFAULT_EXPIRES_IN,
                "token response missing expires_in"
            );
            DEFAULT_EXPIRES_IN
        });

        let issued_at = self.clock.now();
        let lifetime = i64::try_from(expires_in.min(MAX_EXPIRES_IN))
            .map(chrono::Duration::seconds)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_EXPIRES_IN as i64));
        Ok(SessionToken {
            value: Secret::new(parsed.access_token),
            expires_at: issued_at + lifetime - self.refresh_margin,
        })
    }

    fn token_request(&self) -> PortalResult<NetRequest> {
        let credential = &self.credential;
        let mut request = match credential.token_auth {
            TokenRequestAuth::Basic => {
                let mut form = vec![("grant_type".to_string(), "client_credentials".to_string())];
                if let Some(scope) = &credential.scope {
                    form.push(("scope".to_string(), scope.clone()));
                }
                let basic = STANDARD.encode(format!(
                    "{}:{}",
                    credential.client_id,
                    credential.client_secret.expose()
                ));
                let mut header = HeaderValue::from_str(&format!("Basic {basic}")).map_err(|_| {
                    PortalError::Configuration("oauth2 client credentials are not header-safe".into())
                })?;
                header.set_sensitive(true);
                NetRequest::post(credential.token_url.clone(), Body::Form(form))
                    .with_header(AUTHORIZATION, header)
            }
            TokenRequestAuth::NonceDigest => {
                let created = self.clock.now().to_rfc3339();
                let nonce = random_nonce();
                let body = serde_json::json!({
                    "client_id": credential.client_id,
                    "nonce": nonce,
                    "created": created,
                    "password_digest": nonce_digest(&nonce, &created, &credential.client_secret),
                    "grant_type": "client_credentials",
                });
                NetRequest::post(credential.token_url.clone(), Body::Json(body))
            }
        };
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(request)
    }
}

impl std::fmt::Debug for OAuth2ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ClientCredentials")
            .field("client_id", &self.credential.client_id)
            .field("token_url", &self.credential.token_url.as_str())
            .field("token_auth", &self.credential.token_auth)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for OAuth2ClientCredentials {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth2ClientCredentials
    }

    async fn ensure_valid(&self) -> PortalResult<()> {
        if self.usable_token().is_some() {
            return Ok(());
        }

        let _gate = self.refresh_gate.lock().await;
        if self.usable_token().is_some() {
            debug!(client_id = %self.credential.client_id, "token refreshed by concurrent caller");
            return Ok(());
        }

        let token = self.refresh().await?;
        info!(
            client_id = %self.credential.client_id,
            expires_at = %token.expires_at,
            "oauth2 token refreshed"
        );
        *self.session.write() = Some(token);
        Ok(())
    }

    fn decorate(&self, request: &mut NetRequest) -> PortalResult<()> {
        let token = self
            .current_token()
            .ok_or_else(|| PortalError::authentication("no oauth2 session established"))?;
        let mut header = HeaderValue::from_str(&format!("Bearer {}", token.value.expose()))
            .map_err(|_| PortalError::authentication("access token is not header-safe"))?;
        header.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, header);
        Ok(())
    }

    async fn invalidate(&self) {
        let _gate = self.refresh_gate.lock().await;
        if self.session.write().take().is_some() {
            debug!(client_id = %self.credential.client_id, "oauth2 session invalidated");
        }
    }

    fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.read().as_ref().map(|token| token.expires_at)
    }
}

fn margin(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

pub(crate) fn nonce_digest(nonce: &str, created: &str, secret: &Secret) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(created.as_bytes());
    hasher.update(secret.expose().as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use chargeguard_core_types::ManualClock;
    use chrono::TimeZone;
    use http::{HeaderMap, StatusCode};
    use portal_net::NetResponse;

    struct TokenEndpoint {
        calls: AtomicUsize,
        delay: Duration,
        status: u16,
        expires_in: u64,
    }

    impl TokenEndpoint {
        fn ok(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                status: 200,
                expires_in: 3_600,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for TokenEndpoint {
        async fn send(&self, _request: NetRequest) -> PortalResult<NetResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.status != 200 {
                return Err(PortalError::from_status(self.status, "invalid_client"));
            }
            let body = format!(
                r#"{{"access_token":"token-{n}","expires_in":{}}}"#,
                self.expires_in
            );
            Ok(NetResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                Bytes::from(body),
                Duration::ZERO,
            ))
        }
    }

    fn credential(token_auth: TokenRequestAuth) -> OAuth2Credential {
        OAuth2Credential {
            client_id: "client-abc".into(),
            client_secret: Secret::new("client-secret-value"),
            token_url: Url::parse("https://auth.example.test/oauth2/token").unwrap(),
            scope: None,
            token_auth,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let endpoint = TokenEndpoint::ok(Duration::from_millis(50));
        let strategy = Arc::new(
            OAuth2ClientCredentials::new(
                credential(TokenRequestAuth::Basic),
                endpoint.clone(),
                Arc::new(ManualClock::new(t0())),
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..20 {
            let strategy = strategy.clone();
            handles.push(tokio::spawn(async move { strategy.ensure_valid().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(endpoint.calls(), 1);
        assert_eq!(strategy.current_token().unwrap().value.expose(), "token-1");
    }

    #[tokio::test]
    async fn refresh_happens_inside_the_safety_margin_only() {
        let endpoint = TokenEndpoint::ok(Duration::ZERO);
        let clock = ManualClock::new(t0());
        let strategy = OAuth2ClientCredentials::new(
            credential(TokenRequestAuth::Basic),
            endpoint.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();

        strategy.ensure_valid().await.unwrap();
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(
            strategy.session_expires_at(),
            Some(t0() + chrono::Duration::seconds(3_540))
        );

        clock.set(t0() + chrono::Duration::seconds(3_000));
        strategy.ensure_valid().await.unwrap();
        assert_eq!(endpoint.calls(), 1);

        clock.set(t0() + chrono::Duration::seconds(3_541));
        strategy.ensure_valid().await.unwrap();
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn decorate_attaches_bearer_and_invalidate_forces_refresh() {
        let endpoint = TokenEndpoint::ok(Duration::ZERO);
        let strategy = OAuth2ClientCredentials::new(
            credential(TokenRequestAuth::NonceDigest),
            endpoint.clone(),
            Arc::new(ManualClock::new(t0())),
        )
        .unwrap();

        strategy.ensure_valid().await.unwrap();
        let mut request = NetRequest::get(Url::parse("https://api.example.test/disputes").unwrap());
        strategy.decorate(&mut request).unwrap();
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer token-1");

        strategy.invalidate().await;
        assert!(strategy.current_token().is_none());
        strategy.ensure_valid().await.unwrap();
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn oversized_expires_in_is_clamped() {
        let endpoint = Arc::new(TokenEndpoint {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            status: 200,
            expires_in: u64::MAX,
        });
        let clock = ManualClock::new(t0());
        let strategy = OAuth2ClientCredentials::new(
            credential(TokenRequestAuth::Basic),
            endpoint.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();

        strategy.ensure_valid().await.unwrap();
        assert_eq!(
            strategy.session_expires_at(),
            Some(t0() + chrono::Duration::seconds(MAX_EXPIRES_IN as i64 - 60))
        );
        clock.set(t0() + chrono::Duration::seconds(3_600));
        strategy.ensure_valid().await.unwrap();
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_authentication_errors() {
        let endpoint = Arc::new(TokenEndpoint {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            status: 400,
            expires_in: 3_600,
        });
        let strategy = OAuth2ClientCredentials::new(
            credential(TokenRequestAuth::Basic),
            endpoint,
            Arc::new(ManualClock::new(t0())),
        )
        .unwrap();

        let err = strategy.ensure_valid().await.unwrap_err();
        assert!(err.is_authentication(), "{err:?}");
    }

    #[test]
    fn margin_is_never_below_sixty_seconds() {
        let strategy = OAuth2ClientCredentials::new(
            credential(TokenRequestAuth::Basic),
            TokenEndpoint::ok(Duration::ZERO),
            Arc::new(ManualClock::new(t0())),
        )
        .unwrap()
        .with_refresh_margin(Duration::from_secs(5));
        assert_eq!(strategy.refresh_margin, chrono::Duration::seconds(60));
    }

    #[test]
    fn nonce_digest_is_deterministic_for_fixed_inputs() {
        let secret = Secret::new("s3cret");
        let a = nonce_digest("bm9uY2U=", "2024-01-01T00:00:00+00:00", &secret);
        let b = nonce_digest("bm9uY2U=", "2024-01-01T00:00:00+00:00", &secret);
        assert_eq!(a, b);
        assert_ne!(a, nonce_digest("other", "2024-01-01T00:00:00+00:00", &secret));
    }
}
