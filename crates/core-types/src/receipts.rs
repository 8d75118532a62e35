use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispute::CanonicalDispute;
use crate::secret::Secret;
use crate::status::CanonicalStatus;

pub const MAX_PAGE_LIMIT: u32 = 100;
const DEFAULT_PAGE_LIMIT: u32 = 25;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthStatus {
    pub fn ok(message: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            authenticated: true,
            message: message.into(),
            expires_at,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            message: message.into(),
            expires_at: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub dispute_id: String,
    pub status: CanonicalStatus,
    pub portal_status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub dispute: CanonicalDispute,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeFilter {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<CanonicalStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub cursor: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for DisputeFilter {
    fn default() -> Self {
        Self {
            since: None,
            status: None,
            page: default_page(),
            limit: default_limit(),
            cursor: None,
        }
    }
}

impl DisputeFilter {
    /// Requested page size clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn matches(&self, dispute: &CanonicalDispute) -> bool {
        let status_ok = self.status.map_or(true, |status| dispute.status == status);
        let since_ok = self.since.map_or(true, |since| dispute.dispute_date >= since);
        status_ok && since_ok
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputePage {
    pub disputes: Vec<CanonicalDispute>,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceDocument {
    /// Evidence category in the portal's vocabulary, e.g. `receipt`.
    pub kind: String,
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub portal_file_id: Option<String>,
    #[serde(default)]
    pub content_base64: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePackage {
    #[serde(default)]
    pub narrative: Option<String>,
    /// Compelling-evidence text fields keyed by evidence name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub documents: Vec<EvidenceDocument>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Refunded,
    Resolved,
    Contested,
    Declined,
    Acknowledged,
}

impl ResponseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseOutcome::Refunded => "refunded",
            ResponseOutcome::Resolved => "resolved",
            ResponseOutcome::Contested => "contested",
            ResponseOutcome::Declined => "declined",
            ResponseOutcome::Acknowledged => "acknowledged",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub outcome: ResponseOutcome,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    EvidenceSubmitted,
    ResponsePushed,
    DisputeAccepted,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReceipt {
    pub kind: ReceiptKind,
    pub dispute_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub idempotency_key: String,
    pub status: CanonicalStatus,
    pub portal_status: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub subscription_id: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(skip)]
    pub signing_secret: Secret,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub latency_ms: u64,
    pub message: String,
    pub details: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_capped_at_one_hundred() {
        let filter = DisputeFilter {
            limit: 5_000,
            ..DisputeFilter::default()
        };
        assert_eq!(filter.effective_limit(), MAX_PAGE_LIMIT);
        let filter = DisputeFilter {
            limit: 0,
            page: 0,
            ..DisputeFilter::default()
        };
        assert_eq!(filter.effective_limit(), 1);
        assert_eq!(filter.effective_page(), 1);
    }

    #[test]
    fn filter_deserializes_with_defaults() {
        let filter: DisputeFilter = serde_json::from_str(r#"{"status":"WON"}"#).unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 25);
        assert_eq!(filter.status, Some(CanonicalStatus::Won));
    }
}
