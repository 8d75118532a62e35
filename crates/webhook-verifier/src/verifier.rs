use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chargeguard_core_types::{Clock, PortalError, PortalResult, Secret, Verification};
use http::HeaderMap;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::scheme::{parse_timestamped, HmacAlgorithm, SignatureScheme};

/// Checks inbound deliveries against one portal's signing scheme.
///
/// Fail-closed once a secret is configured: a missing or mismatching
/// signature is a [`PortalError::SignatureVerification`]. Without a secret the
/// check is skipped and reported as [`Verification::Skipped`].
pub struct WebhookVerifier {
    scheme: SignatureScheme,
    secret: Option<Secret>,
    clock: Arc<dyn Clock>,
}

impl WebhookVerifier {
    pub fn new(scheme: SignatureScheme, secret: Option<Secret>, clock: Arc<dyn Clock>) -> Self {
        let secret = secret.filter(|secret| !secret.is_empty());
        Self {
            scheme,
            secret,
            clock,
        }
    }

    pub fn scheme(&self) -> &SignatureScheme {
        &self.scheme
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> PortalResult<Verification> {
        let Some(secret) = &self.secret else {
            warn!(
                scheme = self.scheme.name(),
                "webhook secret not configured; signature check skipped"
            );
            return Ok(Verification::Skipped);
        };

        let header = self.scheme.header();
        let provided = headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                PortalError::SignatureVerification(format!("missing {header} header"))
            })?;

        let key = secret.expose().as_bytes();
        let valid = match &self.scheme {
            SignatureScheme::RawHmacHex {
                algorithm, prefix, ..
            } => verify_raw_hex(*algorithm, prefix.as_deref(), key, provided, body)?,
            SignatureScheme::TimestampedHmac { tolerance_secs, .. } => {
                self.verify_timestamped(*tolerance_secs, key, provided, body)?
            }
            SignatureScheme::UrlBodyHmacBase64 {
                algorithm,
                url_header,
                notification_url,
                ..
            } => {
                let url = url_header
                    .as_ref()
                    .and_then(|name| headers.get(name))
                    .and_then(|value| value.to_str().ok())
                    .or(notification_url.as_deref())
                    .ok_or_else(|| {
                        PortalError::SignatureVerification("notification url unknown".into())
                    })?;
                let expected =
                    STANDARD.encode(algorithm.compute(key, &[url.as_bytes(), body])?);
                bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
            }
        };

        if valid {
            debug!(scheme = self.scheme.name(), "webhook signature verified");
            Ok(Verification::Verified)
        } else {
            warn!(scheme = self.scheme.name(), "webhook signature mismatch");
            Err(PortalError::SignatureVerification(
                "signature mismatch".into(),
            ))
        }
    }

    fn verify_timestamped(
        &self,
        tolerance_secs: i64,
        key: &[u8],
        provided: &str,
        body: &[u8],
    ) -> PortalResult<bool> {
        let parsed = parse_timestamped(provided);
        let timestamp = parsed
            .timestamp
            .ok_or_else(|| PortalError::SignatureVerification("signature timestamp missing".into()))?;
        let unix = timestamp
            .parse::<i64>()
            .map_err(|_| PortalError::SignatureVerification("invalid signature timestamp".into()))?;
        if parsed.signatures.is_empty() {
            return Err(PortalError::SignatureVerification(
                "no v1 signature present".into(),
            ));
        }

        let skew = self.clock.now().timestamp().abs_diff(unix);
        if skew > tolerance_secs.max(0).unsigned_abs() {
            return Err(PortalError::SignatureVerification(format!(
                "signature timestamp outside tolerance ({skew}s > {tolerance_secs}s)"
            )));
        }

        let expected = HmacAlgorithm::Sha256.compute(key, &[timestamp.as_bytes(), b".", body])?;
        Ok(parsed.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| bool::from(expected.ct_eq(&bytes)))
                .unwrap_or(false)
        }))
    }

    /// Produces the header value the portal would send for `body`; used by
    /// replay tooling and tests.
    pub fn sign(&self, body: &[u8]) -> PortalResult<String> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| PortalError::Configuration("webhook secret not configured".into()))?;
        let key = secret.expose().as_bytes();
        match &self.scheme {
            SignatureScheme::RawHmacHex {
                algorithm, prefix, ..
            } => {
                let digest = hex::encode(algorithm.compute(key, &[body])?);
                Ok(format!("{}{digest}", prefix.as_deref().unwrap_or_default()))
            }
            SignatureScheme::TimestampedHmac { .. } => {
                let timestamp = self.clock.now().timestamp().to_string();
                let digest = HmacAlgorithm::Sha256.compute(key, &[timestamp.as_bytes(), b".", body])?;
                Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
            }
            SignatureScheme::UrlBodyHmacBase64 {
                algorithm,
                notification_url,
                ..
            } => {
                let url = notification_url.as_deref().ok_or_else(|| {
                    PortalError::Configuration("notification url not configured".into())
                })?;
                Ok(STANDARD.encode(algorithm.compute(key, &[url.as_bytes(), body])?))
            }
        }
    }
}

fn verify_raw_hex(
    algorithm: HmacAlgorithm,
    prefix: Option<&str>,
    key: &[u8],
    provided: &str,
    body: &[u8],
) -> PortalResult<bool> {
    let digest = match prefix {
        Some(prefix) => match strip_prefix_ignore_case(provided, prefix) {
            Some(rest) => rest,
            None => return Ok(false),
        },
        None => provided,
    };
    let Ok(provided) = hex::decode(digest) else {
        return Ok(false);
    };
    let expected = algorithm.compute(key, &[body])?;
    Ok(bool::from(expected.ct_eq(&provided)))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("scheme", &self.scheme.name())
            .field("secret", &self.secret)
            .finish()
    }
}
