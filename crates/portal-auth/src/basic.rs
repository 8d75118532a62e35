use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chargeguard_core_types::{PortalError, PortalResult, Secret};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use portal_net::NetRequest;

use crate::strategy::{AuthScheme, AuthStrategy};

/// HTTP Basic with the API key as username and an empty password.
#[derive(Clone, Debug)]
pub struct BasicEmptyPassword {
    header: HeaderValue,
}

impl BasicEmptyPassword {
    pub fn new(api_key: &Secret) -> PortalResult<Self> {
        if api_key.is_empty() {
            return Err(PortalError::Configuration("api key is empty".into()));
        }
        let encoded = STANDARD.encode(format!("{}:", api_key.expose()));
        let mut header = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|_| PortalError::Configuration("api key is not header-safe".into()))?;
        header.set_sensitive(true);
        Ok(Self { header })
    }
}

#[async_trait]
impl AuthStrategy for BasicEmptyPassword {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::BasicEmptyPassword
    }

    async fn ensure_valid(&self) -> PortalResult<()> {
        Ok(())
    }

    fn decorate(&self, request: &mut NetRequest) -> PortalResult<()> {
        request.headers.insert(AUTHORIZATION, self.header.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn encodes_key_with_trailing_colon() {
        let strategy = BasicEmptyPassword::new(&Secret::new("sk_test_123")).unwrap();
        let mut request = NetRequest::get(Url::parse("https://api.stripe.test/v1/balance").unwrap());
        strategy.decorate(&mut request).unwrap();
        let expected = format!("Basic {}", STANDARD.encode("sk_test_123:"));
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), expected.as_str());
    }

    #[test]
    fn empty_key_is_a_configuration_error() {
        assert!(matches!(
            BasicEmptyPassword::new(&Secret::new("")),
            Err(PortalError::Configuration(_))
        ));
    }
}
