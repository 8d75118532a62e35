//! Signature checks for inbound portal webhooks.

pub mod scheme;
pub mod verifier;

pub use scheme::{HmacAlgorithm, SignatureScheme, DEFAULT_TIMESTAMP_TOLERANCE_SECS};
pub use verifier::WebhookVerifier;
