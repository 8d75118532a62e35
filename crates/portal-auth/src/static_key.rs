use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chargeguard_core_types::{PortalError, PortalResult, Secret};
use http::{HeaderName, HeaderValue};
use portal_net::NetRequest;

use crate::strategy::{AuthScheme, AuthStrategy};

/// Fixed headers resolved once at construction.
#[derive(Clone, Debug, Default)]
pub struct StaticKeyHeader {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl StaticKeyHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bearer(token: &Secret) -> PortalResult<Self> {
        Self::new().with_secret_header("authorization", &format!("Bearer {}", token.expose()))
    }

    /// HTTP Basic with both halves supplied.
    pub fn basic(username: &Secret, password: &Secret) -> PortalResult<Self> {
        let encoded = STANDARD.encode(format!("{}:{}", username.expose(), password.expose()));
        Self::new().with_secret_header("authorization", &format!("Basic {encoded}"))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> PortalResult<Self> {
        let (name, value) = parse_header(name, value)?;
        self.headers.push((name, value));
        Ok(self)
    }

    /// Like [`Self::with_header`] but flags the value as sensitive so it is
    /// redacted from `Debug` output.
    pub fn with_secret_header(mut self, name: &str, value: &str) -> PortalResult<Self> {
        let (name, mut value) = parse_header(name, value)?;
        value.set_sensitive(true);
        self.headers.push((name, value));
        Ok(self)
    }
}

fn parse_header(name: &str, value: &str) -> PortalResult<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| PortalError::Configuration(format!("invalid header name {name}: {err}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| PortalError::Configuration(format!("invalid value for header {name}")))?;
    Ok((name, value))
}

#[async_trait]
impl AuthStrategy for StaticKeyHeader {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::StaticKeyHeader
    }

    async fn ensure_valid(&self) -> PortalResult<()> {
        Ok(())
    }

    fn decorate(&self, request: &mut NetRequest) -> PortalResult<()> {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn headers_are_applied_and_redacted() {
        let strategy = StaticKeyHeader::bearer(&Secret::new("EAAAEtoken-value-123"))
            .unwrap()
            .with_header("square-version", "2024-01-18")
            .unwrap();
        let mut request = NetRequest::get(Url::parse("https://example.test/v2/disputes").unwrap());
        strategy.decorate(&mut request).unwrap();
        assert_eq!(
            request.headers.get("authorization").unwrap(),
            "Bearer EAAAEtoken-value-123"
        );
        assert_eq!(request.headers.get("square-version").unwrap(), "2024-01-18");
        assert!(!format!("{strategy:?}").contains("token-value"));
    }

    #[test]
    fn basic_joins_username_and_password() {
        let strategy =
            StaticKeyHeader::basic(&Secret::new("login"), &Secret::new("key")).unwrap();
        let mut request = NetRequest::get(Url::parse("https://example.test/rest").unwrap());
        strategy.decorate(&mut request).unwrap();
        // base64("login:key")
        assert_eq!(
            request.headers.get("authorization").unwrap(),
            "Basic bG9naW46a2V5"
        );
    }

    #[test]
    fn rejects_invalid_header_names() {
        assert!(StaticKeyHeader::new().with_header("bad header", "x").is_err());
    }
}
