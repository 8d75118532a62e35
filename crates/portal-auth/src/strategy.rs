use std::fmt;

use async_trait::async_trait;
use chargeguard_core_types::PortalResult;
use chrono::{DateTime, Utc};
use portal_net::NetRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    StaticKeyHeader,
    OAuth2ClientCredentials,
    OAuth1Signing,
    BasicEmptyPassword,
    BodyEmbedded,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthScheme::StaticKeyHeader => "static_key_header",
            AuthScheme::OAuth2ClientCredentials => "oauth2_client_credentials",
            AuthScheme::OAuth1Signing => "oauth1_signing",
            AuthScheme::BasicEmptyPassword => "basic_empty_password",
            AuthScheme::BodyEmbedded => "body_embedded",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn scheme(&self) -> AuthScheme;

    /// Makes sure a usable session exists. May perform network I/O.
    async fn ensure_valid(&self) -> PortalResult<()>;

    /// Applies credentials to one outgoing request.
    fn decorate(&self, request: &mut NetRequest) -> PortalResult<()>;

    /// Drops cached session state after the portal rejected it.
    async fn invalidate(&self) {}

    /// Expiry of the current session, for strategies that have one.
    fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}
