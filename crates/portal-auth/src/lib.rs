//! Authentication strategies for outbound portal calls.
//!
//! Each portal is bound to exactly one [`AuthStrategy`]. The adapter runtime
//! calls [`AuthStrategy::ensure_valid`] before every attempt and
//! [`AuthStrategy::decorate`] on the concrete request that attempt sends, so
//! per-request signers see the final body and a fresh nonce on each retry.

pub mod basic;
pub mod body_embedded;
pub mod oauth1;
pub mod oauth2;
pub mod static_key;
pub mod strategy;

pub use basic::BasicEmptyPassword;
pub use body_embedded::{BodyEmbeddedCredentials, EmbedTarget};
pub use oauth1::{OAuth1Credential, OAuth1SignatureMethod, OAuth1SigningPerRequest};
pub use oauth2::{OAuth2ClientCredentials, OAuth2Credential, SessionToken, TokenRequestAuth};
pub use static_key::StaticKeyHeader;
pub use strategy::{AuthScheme, AuthStrategy};
