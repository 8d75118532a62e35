use async_trait::async_trait;
use bytes::Bytes;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, DisputeFilter, DisputePage, EvidencePackage,
    HealthReport, PortalError, PortalKind, PortalResult, ResponseData, StatusSnapshot,
    WebhookConfig, WebhookEvent, WebhookSubscription,
};
use http::HeaderMap;
use serde_json::Value;

/// Inbound webhook body as handed over by the HTTP layer.
///
/// Signature schemes hash the exact bytes the portal sent, so callers should
/// prefer [`WebhookBody::Raw`]. A structured body is re-serialized before
/// verification and will only verify when that serialization happens to
/// match.
#[derive(Clone, Debug)]
pub enum WebhookBody {
    Raw(Bytes),
    Text(String),
    Json(Value),
}

impl WebhookBody {
    pub fn into_bytes(self) -> PortalResult<Bytes> {
        match self {
            WebhookBody::Raw(bytes) => Ok(bytes),
            WebhookBody::Text(text) => Ok(Bytes::from(text)),
            WebhookBody::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
        }
    }
}

impl From<Bytes> for WebhookBody {
    fn from(bytes: Bytes) -> Self {
        WebhookBody::Raw(bytes)
    }
}

impl From<&str> for WebhookBody {
    fn from(text: &str) -> Self {
        WebhookBody::Text(text.to_string())
    }
}

/// Capability contract every portal integration implements.
///
/// Mutating operations mint one idempotency key per call and reuse it for
/// every retry attempt of that call. Operations a portal does not offer fail
/// with [`PortalError::Unsupported`].
#[async_trait]
pub trait PortalAdapter: Send + Sync {
    fn portal(&self) -> PortalKind;

    /// Probes the credentials. A rejection by the portal is reported as
    /// `authenticated = false`; only transport failures are errors.
    async fn authenticate(&self) -> PortalResult<AuthStatus>;

    /// Normalizes a dispute payload the caller already holds.
    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute>;

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot>;

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage>;

    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidencePackage,
    ) -> PortalResult<ActionReceipt>;

    async fn push_response(
        &self,
        _dispute_id: &str,
        _response: &ResponseData,
    ) -> PortalResult<ActionReceipt> {
        Err(PortalError::Unsupported {
            portal: self.portal(),
            operation: "push_response",
        })
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt>;

    async fn parse_webhook_payload(
        &self,
        headers: &HeaderMap,
        body: WebhookBody,
    ) -> PortalResult<WebhookEvent>;

    async fn register_webhook(&self, _config: &WebhookConfig) -> PortalResult<WebhookSubscription> {
        Err(PortalError::Unsupported {
            portal: self.portal(),
            operation: "register_webhook",
        })
    }

    /// Read-only reachability probe; failures are folded into the report.
    async fn health_check(&self) -> HealthReport;
}
