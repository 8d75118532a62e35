use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::dispute::CanonicalDispute;
use crate::portal::PortalKind;

/// Outcome of the signature check that preceded parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Verified,
    /// No secret configured for the portal; the payload is unauthenticated.
    Skipped,
}

/// Inbound push notification. Fields are fixed at construction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    event: String,
    data: Value,
    timestamp: DateTime<Utc>,
    webhook_id: String,
    portal_type: PortalKind,
    verification: Verification,
    #[serde(skip_serializing_if = "Option::is_none")]
    dispute: Option<CanonicalDispute>,
    raw_data: Box<RawValue>,
}

impl WebhookEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        portal_type: PortalKind,
        event: String,
        webhook_id: String,
        timestamp: DateTime<Utc>,
        data: Value,
        verification: Verification,
        dispute: Option<CanonicalDispute>,
        raw_data: Box<RawValue>,
    ) -> Self {
        Self {
            event,
            data,
            timestamp,
            webhook_id,
            portal_type,
            verification,
            dispute,
            raw_data,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn webhook_id(&self) -> &str {
        &self.webhook_id
    }

    pub fn portal_type(&self) -> PortalKind {
        self.portal_type
    }

    pub fn verification(&self) -> Verification {
        self.verification
    }

    pub fn dispute(&self) -> Option<&CanonicalDispute> {
        self.dispute.as_ref()
    }

    pub fn raw_json(&self) -> &str {
        self.raw_data.get()
    }
}
