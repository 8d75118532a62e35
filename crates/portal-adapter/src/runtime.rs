use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chargeguard_core_types::{
    ActionReceipt, AuthStatus, Clock, HealthReport, PortalError, PortalKind, PortalResult,
    ReceiptKind, Secret, Verification, WebhookConfig, WebhookSubscription,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use normalization::NormalizationEngine;
use portal_auth::AuthStrategy;
use portal_net::{
    send_with_timeout, Body, HttpTransport, IdempotencyKeyGenerator, NetRequest, NetResponse,
    RetryPolicy,
};
use rand::RngCore;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;
use webhook_verifier::WebhookVerifier;

use crate::adapter::WebhookBody;
use crate::receipts::{key_prefix, ReceiptCache};

/// Where a portal expects the idempotency key of a mutating call.
#[derive(Clone, Debug)]
pub enum IdempotencyPlacement {
    Header(HeaderName),
    /// Top-level field of the JSON request body.
    BodyField(&'static str),
    /// Field inside the single envelope object, e.g.
    /// `{"createRequest": {"refId": ..}}`.
    EnvelopeField(&'static str),
}

/// Shared collaborators handed to every adapter built from one settings
/// object.
#[derive(Clone)]
pub struct AdapterContext {
    pub transport: Arc<dyn HttpTransport>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub receipt_ttl: Duration,
}

impl AdapterContext {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            receipt_ttl: Duration::from_secs(600),
        }
    }
}

/// Verified and parsed webhook body.
#[derive(Debug)]
pub struct VerifiedPayload {
    pub verification: Verification,
    pub raw: Box<RawValue>,
    pub value: Value,
}

/// The machinery every portal composes: authentication, bounded retry with a
/// per-attempt timeout, idempotency keys, webhook verification and
/// normalization.
pub struct PortalRuntime {
    portal: PortalKind,
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthStrategy>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    timeout: Duration,
    keys: IdempotencyKeyGenerator,
    idempotency: IdempotencyPlacement,
    default_headers: HeaderMap,
    normalizer: NormalizationEngine,
    verifier: Option<WebhookVerifier>,
    receipts: ReceiptCache,
}

impl PortalRuntime {
    pub fn new(
        context: &AdapterContext,
        base_url: Url,
        auth: Arc<dyn AuthStrategy>,
        normalizer: NormalizationEngine,
    ) -> Self {
        let portal = normalizer.portal();
        Self {
            portal,
            base_url,
            transport: context.transport.clone(),
            auth,
            clock: context.clock.clone(),
            retry: context.retry.clone(),
            timeout: context.timeout,
            keys: IdempotencyKeyGenerator::new(portal),
            idempotency: IdempotencyPlacement::Header(HeaderName::from_static("idempotency-key")),
            default_headers: HeaderMap::new(),
            normalizer,
            verifier: None,
            receipts: ReceiptCache::new(context.receipt_ttl),
        }
    }

    pub fn with_idempotency(mut self, placement: IdempotencyPlacement) -> Self {
        self.idempotency = placement;
        self
    }

    pub fn with_verifier(mut self, verifier: WebhookVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_default_header(mut self, name: &'static str, value: &str) -> PortalResult<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| PortalError::Configuration(format!("invalid value for {name}")))?;
        self.default_headers
            .insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn portal(&self) -> PortalKind {
        self.portal
    }

    pub fn normalizer(&self) -> &NormalizationEngine {
        &self.normalizer
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `path` to the base URL, keeping any path prefix the base has.
    pub fn url(&self, path: &str) -> PortalResult<Url> {
        join_url(&self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> PortalResult<NetRequest> {
        let mut request = NetRequest::new(method, self.url(path)?);
        request.headers.extend(self.default_headers.clone());
        request
            .headers
            .insert(http::header::ACCEPT, HeaderValue::from_static("application/json"));
        Ok(request)
    }

    /// Sends `template` under the retry policy. Every attempt re-validates the
    /// session and decorates a fresh copy, so per-request signatures and nonces
    /// are never replayed. A 401/403 drops the cached session.
    pub async fn execute(&self, operation: &str, template: NetRequest) -> PortalResult<NetResponse> {
        let template = &template;
        self.retry
            .run(operation, |attempt| {
                let request = template.clone();
                async move {
                    debug!(
                        portal = %self.portal,
                        operation,
                        attempt,
                        url = %request.url,
                        "portal attempt"
                    );
                    self.attempt(request).await
                }
            })
            .await
    }

    async fn attempt(&self, request: NetRequest) -> PortalResult<NetResponse> {
        match self.send_authorized(request).await {
            Err(err) if err.is_authentication() => {
                warn!(portal = %self.portal, status = ?err.status(), "portal rejected credentials");
                self.auth.invalidate().await;
                Err(err)
            }
            other => other,
        }
    }

    async fn send_authorized(&self, mut request: NetRequest) -> PortalResult<NetResponse> {
        self.auth.ensure_valid().await?;
        self.auth.decorate(&mut request)?;
        send_with_timeout(self.transport.as_ref(), request, self.timeout).await
    }

    pub async fn get(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> PortalResult<NetResponse> {
        let mut request = self.request(Method::GET, path)?;
        if !query.is_empty() {
            request
                .url
                .query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        self.execute(operation, request).await
    }

    /// Mutating call carrying `idempotency_key` wherever the portal wants it.
    pub async fn send_mutation(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Body,
        idempotency_key: &str,
    ) -> PortalResult<NetResponse> {
        let mut request = self.request(method, path)?.with_body(body);
        match &self.idempotency {
            IdempotencyPlacement::Header(name) => {
                let value = HeaderValue::from_str(idempotency_key).map_err(|_| {
                    PortalError::Configuration("idempotency key is not header-safe".into())
                })?;
                request.headers.insert(name.clone(), value);
            }
            IdempotencyPlacement::BodyField(field) => match &mut request.body {
                Body::Json(Value::Object(map)) => {
                    map.insert((*field).to_string(), Value::String(idempotency_key.into()));
                }
                Body::Empty => {
                    let mut map = serde_json::Map::new();
                    map.insert((*field).to_string(), Value::String(idempotency_key.into()));
                    request.body = Body::Json(Value::Object(map));
                }
                _ => return Err(self.json_body_required()),
            },
            IdempotencyPlacement::EnvelopeField(field) => {
                let envelope = match &mut request.body {
                    Body::Json(Value::Object(map)) if map.len() == 1 => {
                        map.values_mut().next().and_then(Value::as_object_mut)
                    }
                    _ => None,
                };
                let envelope = envelope.ok_or_else(|| self.json_body_required())?;
                envelope.insert((*field).to_string(), Value::String(idempotency_key.into()));
            }
        }
        self.execute(operation, request).await
    }

    fn json_body_required(&self) -> PortalError {
        PortalError::Configuration(format!(
            "{} expects the idempotency key in a JSON body",
            self.portal
        ))
    }

    /// Fresh key for a mutation that does not go through [`Self::mutate`].
    pub fn idempotency_key(&self, prefix: &str) -> String {
        self.keys.generate(prefix)
    }

    /// Runs one logical mutation: identical repeats inside the receipt TTL are
    /// answered from memory, otherwise a fresh idempotency key is minted and
    /// handed to `action` for all of its attempts.
    pub async fn mutate<F, Fut>(
        &self,
        kind: ReceiptKind,
        dispute_id: &str,
        payload: &Value,
        action: F,
    ) -> PortalResult<ActionReceipt>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = PortalResult<ActionReceipt>>,
    {
        let fingerprint = ReceiptCache::fingerprint(kind, dispute_id, payload);
        if let Some(receipt) = self.receipts.lookup(&fingerprint) {
            info!(
                portal = %self.portal,
                dispute_id,
                idempotency_key = %receipt.idempotency_key,
                "repeated mutation answered from recorded receipt"
            );
            return Ok(receipt);
        }
        let key = self.keys.generate(key_prefix(kind));
        let receipt = action(key).await?;
        self.receipts.insert(fingerprint, &receipt);
        Ok(receipt)
    }

    pub fn receipt(
        &self,
        kind: ReceiptKind,
        dispute_id: &str,
        idempotency_key: String,
        reference_id: Option<String>,
        portal_status: &str,
    ) -> ActionReceipt {
        ActionReceipt {
            kind,
            dispute_id: dispute_id.to_string(),
            reference_id,
            idempotency_key,
            status: self.normalizer.normalize_status(portal_status),
            portal_status: portal_status.to_string(),
            recorded_at: self.clock.now(),
        }
    }

    /// Credential probe: portal rejections become `authenticated = false`,
    /// transport failures propagate.
    pub async fn probe_auth(&self, probe: NetRequest) -> PortalResult<AuthStatus> {
        match self.execute("authenticate", probe).await {
            Ok(_) => Ok(AuthStatus::ok(
                format!("{} credentials accepted", self.portal),
                self.auth.session_expires_at(),
            )),
            Err(err @ PortalError::TransientNetwork { .. }) => Err(err),
            Err(err) => {
                warn!(portal = %self.portal, error = %err, "credential probe rejected");
                Ok(AuthStatus::rejected(err.to_string()))
            }
        }
    }

    /// Single-attempt reachability probe. Never fails; errors land in the
    /// report. A rejected probe leaves the cached session alone; fetching a
    /// missing token is the only side effect.
    pub async fn probe_health(&self, probe: NetRequest) -> HealthReport {
        let started = Instant::now();
        let outcome = self.send_authorized(probe).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let mut details = json!({
            "portal": self.portal.as_str(),
            "baseUrl": self.base_url.as_str(),
            "authScheme": self.auth.scheme().to_string(),
            "webhookVerification": self.verifier.as_ref().map(|v| v.has_secret()),
        });
        if let Some(expires_at) = self.auth.session_expires_at() {
            details["sessionExpiresAt"] = json!(expires_at.to_rfc3339());
        }
        match outcome {
            Ok(response) => {
                details["status"] = json!(response.status.as_u16());
                HealthReport {
                    healthy: true,
                    latency_ms,
                    message: format!("{} reachable", self.portal),
                    details,
                }
            }
            Err(err) => {
                warn!(portal = %self.portal, error = %err, "health probe failed");
                if let Some(status) = err.status() {
                    details["status"] = json!(status);
                }
                HealthReport {
                    healthy: false,
                    latency_ms,
                    message: err.to_string(),
                    details,
                }
            }
        }
    }

    /// Checks the signature over the exact delivered bytes, then parses them.
    /// Nothing is parsed before the signature passes.
    pub fn verify_webhook(&self, headers: &HeaderMap, body: WebhookBody) -> PortalResult<VerifiedPayload> {
        let verifier = self.verifier.as_ref().ok_or(PortalError::Unsupported {
            portal: self.portal,
            operation: "parse_webhook_payload",
        })?;
        let bytes = body.into_bytes()?;
        let verification = verifier.verify(headers, &bytes)?;

        let text = std::str::from_utf8(&bytes)
            .map_err(|_| PortalError::malformed("webhook body is not utf-8"))?;
        let raw = RawValue::from_string(text.to_owned())
            .map_err(|err| PortalError::malformed(format!("webhook body: {err}")))?;
        let value: Value = serde_json::from_str(raw.get())?;
        if !value.is_object() {
            return Err(PortalError::malformed("webhook body is not a JSON object"));
        }
        Ok(VerifiedPayload {
            verification,
            raw,
            value,
        })
    }

    /// Subscription descriptor with a freshly minted signing secret unless
    /// the portal issued one itself.
    pub fn subscription(
        &self,
        config: &WebhookConfig,
        subscription_id: String,
        portal_secret: Option<String>,
    ) -> WebhookSubscription {
        let signing_secret = portal_secret
            .filter(|secret| !secret.is_empty())
            .map(Secret::new)
            .unwrap_or_else(generate_signing_secret);
        WebhookSubscription {
            subscription_id,
            url: config.url.clone(),
            events: config.events.clone(),
            signing_secret,
            created_at: self.clock.now(),
        }
    }
}

/// `base` + `path` without dropping the base's own path segments, which
/// `Url::join` would do for a base lacking a trailing slash.
pub fn join_url(base: &Url, path: &str) -> PortalResult<Url> {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    };
    Url::parse(&joined)
        .map_err(|err| PortalError::Configuration(format!("invalid url {joined}: {err}")))
}

/// 32 random bytes, hex encoded.
pub fn generate_signing_secret() -> Secret {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Secret::new(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keeps_base_path_prefix() {
        let base = Url::parse("https://api.mastercard.com/mastercom").unwrap();
        assert_eq!(
            join_url(&base, "/v6/claims").unwrap().as_str(),
            "https://api.mastercard.com/mastercom/v6/claims"
        );
        let root = Url::parse("https://api.stripe.com/").unwrap();
        assert_eq!(join_url(&root, "v1/disputes").unwrap().as_str(), "https://api.stripe.com/v1/disputes");
    }

    #[test]
    fn signing_secrets_are_distinct_hex() {
        let a = generate_signing_secret();
        let b = generate_signing_secret();
        assert_eq!(a.expose().len(), 64);
        assert!(a.expose().bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.expose(), b.expose());
    }
}
