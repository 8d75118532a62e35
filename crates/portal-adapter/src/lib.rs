//! The `PortalAdapter` contract plus the concrete portal integrations built on
//! the shared runtime (auth, retry, idempotency, verification and
//! normalization).

pub mod adapter;
pub mod config;
pub mod extract;
pub mod portals;
pub mod receipts;
pub mod registry;
pub mod runtime;

pub use adapter::{PortalAdapter, WebhookBody};
pub use config::{resolve_base_url, GatewaySettings, HttpSettings, PortalSettings, RetrySettings};
pub use portals::normalizer_for;
pub use receipts::ReceiptCache;
pub use registry::{build_adapter, build_adapter_with_clock, build_configured};
pub use runtime::{generate_signing_secret, AdapterContext, IdempotencyPlacement, PortalRuntime};
