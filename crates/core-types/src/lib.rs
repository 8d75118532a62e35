//! Canonical vocabulary shared by every chargeguard portal crate.
//!
//! Portal adapters translate their native payloads into these types; nothing
//! downstream of an adapter should ever see a portal-specific shape except
//! through the `raw_data` fields kept for audit.

pub mod clock;
pub mod dispute;
pub mod errors;
pub mod portal;
pub mod reason;
pub mod receipts;
pub mod secret;
pub mod status;
pub mod webhook;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispute::{CanonicalDispute, CardBrand, DisputeFields};
pub use errors::{PortalError, PortalResult};
pub use portal::PortalKind;
pub use reason::{MappingSource, ReasonCategory, ReasonMapping};
pub use receipts::{
    ActionReceipt, AuthStatus, DisputeFilter, DisputePage, EvidenceDocument, EvidencePackage,
    HealthReport, ReceiptKind, ResponseData, ResponseOutcome, StatusSnapshot, WebhookConfig,
    WebhookSubscription, MAX_PAGE_LIMIT,
};
pub use secret::{mask_secret, Secret};
pub use status::CanonicalStatus;
pub use webhook::{Verification, WebhookEvent};
