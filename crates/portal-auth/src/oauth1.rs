use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chargeguard_core_types::{Clock, PortalError, PortalResult, Secret};
use hmac::{Hmac, Mac};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use portal_net::NetRequest;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;
use url::Url;
use urlencoding::encode;

use crate::strategy::{AuthScheme, AuthStrategy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuth1SignatureMethod {
    /// PKCS#1 v1.5 over SHA-256 with the portal-issued private key.
    RsaSha256,
    HmacSha256,
    HmacSha512,
}

impl OAuth1SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuth1SignatureMethod::RsaSha256 => "RSA-SHA256",
            OAuth1SignatureMethod::HmacSha256 => "HMAC-SHA256",
            OAuth1SignatureMethod::HmacSha512 => "HMAC-SHA512",
        }
    }
}

#[derive(Clone, Debug)]
pub struct OAuth1Credential {
    pub consumer_key: String,
    /// PEM private key (PKCS#8 or PKCS#1) for `RsaSha256`, shared secret
    /// otherwise.
    pub signing_key: Secret,
    pub token: Option<String>,
    pub token_secret: Option<Secret>,
    pub signature_method: OAuth1SignatureMethod,
}

enum KeyMaterial {
    Rsa(Box<SigningKey<Sha256>>),
    Hmac,
}

/// Signs every request individually; holds no session state.
pub struct OAuth1SigningPerRequest {
    credential: OAuth1Credential,
    key: KeyMaterial,
    clock: Arc<dyn Clock>,
}

impl OAuth1SigningPerRequest {
    pub fn new(credential: OAuth1Credential, clock: Arc<dyn Clock>) -> PortalResult<Self> {
        if credential.consumer_key.is_empty() || credential.signing_key.is_empty() {
            return Err(PortalError::Configuration(
                "oauth1 consumer key and signing key are required".into(),
            ));
        }
        let key = match credential.signature_method {
            OAuth1SignatureMethod::RsaSha256 => {
                let private = load_private_key(credential.signing_key.expose())?;
                KeyMaterial::Rsa(Box::new(SigningKey::<Sha256>::new(private)))
            }
            OAuth1SignatureMethod::HmacSha256 | OAuth1SignatureMethod::HmacSha512 => {
                KeyMaterial::Hmac
            }
        };
        Ok(Self {
            credential,
            key,
            clock,
        })
    }

    /// Builds the `Authorization` header value for `request` with the given
    /// nonce and timestamp.
    pub fn sign_with(&self, request: &NetRequest, nonce: &str, timestamp: i64) -> PortalResult<String> {
        let mut oauth_params = self.oauth_params(request, nonce, timestamp)?;
        let base = signature_base_string(request.method.as_str(), &request.url, &oauth_params);
        let signature = STANDARD.encode(self.sign(base.as_bytes())?);
        oauth_params.push(("oauth_signature".to_string(), signature));

        let rendered: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        Ok(format!("OAuth {}", rendered.join(",")))
    }

    fn oauth_params(
        &self,
        request: &NetRequest,
        nonce: &str,
        timestamp: i64,
    ) -> PortalResult<Vec<(String, String)>> {
        let body = request.body.to_bytes()?;
        let body_hash = STANDARD.encode(Sha256::digest(&body));

        let mut params = vec![
            ("oauth_body_hash".to_string(), body_hash),
            ("oauth_consumer_key".to_string(), self.credential.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            (
                "oauth_signature_method".to_string(),
                self.credential.signature_method.as_str().to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some(token) = &self.credential.token {
            params.push(("oauth_token".to_string(), token.clone()));
        }
        Ok(params)
    }

    fn sign(&self, base: &[u8]) -> PortalResult<Vec<u8>> {
        let hmac_key = || {
            format!(
                "{}&{}",
                encode(self.credential.signing_key.expose()),
                encode(
                    self.credential
                        .token_secret
                        .as_ref()
                        .map(Secret::expose)
                        .unwrap_or_default()
                )
            )
        };
        let invalid = |_| PortalError::Configuration("oauth1 signing key rejected".into());
        match (&self.key, self.credential.signature_method) {
            (KeyMaterial::Rsa(key), _) => key
                .try_sign(base)
                .map(|signature| signature.to_vec())
                .map_err(|err| PortalError::Configuration(format!("rsa signing failed: {err}"))),
            (KeyMaterial::Hmac, OAuth1SignatureMethod::HmacSha512) => {
                let key = hmac_key();
                let mut mac = Hmac::<Sha512>::new_from_slice(key.as_bytes()).map_err(invalid)?;
                mac.update(base);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            (KeyMaterial::Hmac, _) => {
                let key = hmac_key();
                let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).map_err(invalid)?;
                mac.update(base);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

/// Accepts `BEGIN PRIVATE KEY` (PKCS#8) and `BEGIN RSA PRIVATE KEY` (PKCS#1).
fn load_private_key(pem: &str) -> PortalResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| {
            PortalError::Configuration("oauth1 signing key is not a PEM RSA private key".into())
        })
}

impl std::fmt::Debug for OAuth1SigningPerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1SigningPerRequest")
            .field("consumer_key", &self.credential.consumer_key)
            .field("signature_method", &self.credential.signature_method)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for OAuth1SigningPerRequest {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth1Signing
    }

    async fn ensure_valid(&self) -> PortalResult<()> {
        Ok(())
    }

    fn decorate(&self, request: &mut NetRequest) -> PortalResult<()> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let timestamp = self.clock.now().timestamp();
        let header = self.sign_with(request, &nonce, timestamp)?;
        let mut value = HeaderValue::from_str(&header)
            .map_err(|_| PortalError::Configuration("oauth1 header is not header-safe".into()))?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// `METHOD&enc(base_url)&enc(sorted params)`, with query parameters folded in.
fn signature_base_string(method: &str, url: &Url, oauth_params: &[(String, String)]) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (encode(&k).into_owned(), encode(&v).into_owned()))
        .collect();
    params.extend(
        oauth_params
            .iter()
            .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned())),
    );
    params.sort();
    let normalized = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(base_url.as_str()),
        encode(&normalized)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargeguard_core_types::ManualClock;
    use chrono::{TimeZone, Utc};
    use portal_net::Body;
    use serde_json::json;

    fn signer() -> OAuth1SigningPerRequest {
        OAuth1SigningPerRequest::new(
            OAuth1Credential {
                consumer_key: "consumer-key-001".into(),
                signing_key: Secret::new("signing-secret"),
                token: None,
                token_secret: None,
                signature_method: OAuth1SignatureMethod::HmacSha256,
            },
            Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
        )
        .unwrap()
    }

    fn request() -> NetRequest {
        NetRequest::post(
            Url::parse("https://api.mastercard.test/mastercom/v6/claims?page=2&limit=10").unwrap(),
            Body::Json(json!({ "claimId": "200002020654" })),
        )
    }

    fn rsa_signer(pem: &str) -> PortalResult<OAuth1SigningPerRequest> {
        OAuth1SigningPerRequest::new(
            OAuth1Credential {
                consumer_key: "consumer-key-001".into(),
                signing_key: Secret::new(pem),
                token: None,
                token_secret: None,
                signature_method: OAuth1SignatureMethod::RsaSha256,
            },
            Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap())),
        )
    }

    fn header_param(header: &str, name: &str) -> String {
        let marker = format!("{name}=\"");
        let start = header.find(&marker).unwrap() + marker.len();
        let end = start + header[start..].find('"').unwrap();
        urlencoding::decode(&header[start..end]).unwrap().into_owned()
    }

    #[test]
    fn reserved_characters_are_escaped_in_the_base_string() {
        let url = Url::parse("https://x.test/claims?q=a%20b%2Bc").unwrap();
        let base = signature_base_string("post", &url, &[]);
        // `a b+c` is escaped once for the pair and again for the whole string
        assert_eq!(base, "POST&https%3A%2F%2Fx.test%2Fclaims&q%3Da%2520b%252Bc");
    }

    #[test]
    fn rsa_signature_verifies_with_the_public_key() {
        use rsa::pkcs1v15::{Signature, VerifyingKey};
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::signature::Verifier;

        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = private.to_pkcs8_pem(LineEnding::LF).unwrap();
        let signer = rsa_signer(pem.as_str()).unwrap();

        let request = request();
        let header = signer.sign_with(&request, "abc123", 1_700_000_000).unwrap();
        assert!(header.contains("oauth_signature_method=\"RSA-SHA256\""));

        let params = signer.oauth_params(&request, "abc123", 1_700_000_000).unwrap();
        let base = signature_base_string("POST", &request.url, &params);
        let raw = STANDARD
            .decode(header_param(&header, "oauth_signature"))
            .unwrap();
        let signature = Signature::try_from(raw.as_slice()).unwrap();
        let verifier = VerifyingKey::<Sha256>::new(private.to_public_key());
        assert!(verifier.verify(base.as_bytes(), &signature).is_ok());

        let tampered = signature_base_string("GET", &request.url, &params);
        assert!(verifier.verify(tampered.as_bytes(), &signature).is_err());
    }

    #[test]
    fn rsa_method_requires_a_pem_private_key() {
        let err = rsa_signer("not-a-pem").unwrap_err();
        assert!(matches!(err, PortalError::Configuration(message) if message.contains("PEM")));
    }

    #[test]
    fn base_string_sorts_query_and_oauth_params() {
        let url = Url::parse("https://x.test/path?b=2&a=1").unwrap();
        let base = signature_base_string(
            "get",
            &url,
            &[("oauth_nonce".to_string(), "n".to_string())],
        );
        assert_eq!(
            base,
            "GET&https%3A%2F%2Fx.test%2Fpath&a%3D1%26b%3D2%26oauth_nonce%3Dn"
        );
    }

    #[test]
    fn signature_is_stable_for_fixed_nonce_and_changes_with_body() {
        let signer = signer();
        let first = signer.sign_with(&request(), "abc123", 1_700_000_000).unwrap();
        let again = signer.sign_with(&request(), "abc123", 1_700_000_000).unwrap();
        assert_eq!(first, again);
        assert!(first.starts_with("OAuth "));
        assert!(first.contains("oauth_signature_method=\"HMAC-SHA256\""));
        assert!(first.contains("oauth_body_hash="));

        let other_body = request().with_body(Body::Json(json!({ "claimId": "other" })));
        let changed = signer.sign_with(&other_body, "abc123", 1_700_000_000).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn every_decorated_request_gets_a_fresh_nonce() {
        let signer = signer();
        let mut a = request();
        let mut b = request();
        signer.decorate(&mut a).unwrap();
        signer.decorate(&mut b).unwrap();
        assert_ne!(
            a.headers.get(AUTHORIZATION).unwrap(),
            b.headers.get(AUTHORIZATION).unwrap()
        );
    }
}
