//! Concrete portal integrations. Each one wires a [`PortalRuntime`] with the
//! portal's auth strategy, signature scheme and vocabulary tables, then maps
//! the portal's REST shape onto [`PortalAdapter`](crate::PortalAdapter).

pub mod authorize_net;
pub mod mastercom;
pub mod paypal;
pub mod square;
pub mod stripe;
pub mod verifi;

pub use authorize_net::AuthorizeNetAdapter;
pub use mastercom::MastercomAdapter;
pub use paypal::PaypalAdapter;
pub use square::SquareAdapter;
pub use stripe::StripeAdapter;
pub use verifi::VerifiAdapter;

use chargeguard_core_types::{
    CanonicalDispute, DisputeFields, DisputeFilter, DisputePage, HealthReport, PortalError,
    PortalKind, PortalResult, StatusSnapshot,
};
use normalization::NormalizationEngine;
use portal_net::NetRequest;
use serde_json::{json, Value};

use crate::runtime::PortalRuntime;

/// Vocabulary tables for `kind` without any credentials attached.
pub fn normalizer_for(kind: PortalKind) -> NormalizationEngine {
    match kind {
        PortalKind::Stripe => stripe::normalizer(),
        PortalKind::Paypal => paypal::normalizer(),
        PortalKind::Mastercom => mastercom::normalizer(),
        PortalKind::AuthorizeNet => authorize_net::normalizer(),
        PortalKind::Square => square::normalizer(),
        PortalKind::Verifi => verifi::normalizer(),
    }
}

pub(crate) fn snapshot(dispute: CanonicalDispute) -> StatusSnapshot {
    StatusSnapshot {
        dispute_id: dispute.dispute_id.clone(),
        status: dispute.status,
        portal_status: dispute.portal_status.clone(),
        due_date: dispute.due_date,
        dispute,
    }
}

/// Normalizes one element of a list response.
pub(crate) fn normalize_item<F>(
    normalizer: &NormalizationEngine,
    item: &Value,
    extract: F,
) -> PortalResult<CanonicalDispute>
where
    F: FnOnce(&Value) -> PortalResult<DisputeFields>,
{
    let raw = serde_json::value::to_raw_value(item)?;
    normalizer.normalize_raw(raw, extract)
}

pub(crate) fn array_at<'a>(body: &'a Value, pointer: &str) -> PortalResult<&'a [Value]> {
    match body.pointer(pointer) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        None | Some(Value::Null) => Ok(&[]),
        Some(_) => Err(PortalError::malformed(format!("{pointer} is not an array"))),
    }
}

/// Applies the canonical-side filters portals cannot express natively.
pub(crate) fn into_page(
    filter: &DisputeFilter,
    disputes: Vec<CanonicalDispute>,
    has_more: bool,
    next_cursor: Option<String>,
) -> DisputePage {
    DisputePage {
        disputes: disputes.into_iter().filter(|d| filter.matches(d)).collect(),
        page: filter.effective_page(),
        limit: filter.effective_limit(),
        has_more,
        next_cursor,
    }
}

/// Rejects ids that would escape their path segment.
pub(crate) fn path_id(dispute_id: &str) -> PortalResult<&str> {
    let id = dispute_id.trim();
    if id.is_empty() || id.contains(['/', '?', '#', '%']) || id.chars().any(char::is_whitespace) {
        return Err(PortalError::malformed(format!("invalid dispute id {dispute_id:?}")));
    }
    Ok(id)
}

pub(crate) async fn health_via(
    runtime: &PortalRuntime,
    probe: PortalResult<NetRequest>,
) -> HealthReport {
    match probe {
        Ok(probe) => runtime.probe_health(probe).await,
        Err(err) => HealthReport {
            healthy: false,
            latency_ms: 0,
            message: err.to_string(),
            details: json!({ "portal": runtime.portal().as_str() }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_ids_reject_traversal() {
        assert_eq!(path_id(" dp_123 ").unwrap(), "dp_123");
        assert!(path_id("").is_err());
        assert!(path_id("../admin").is_err());
        assert!(path_id("a?b=1").is_err());
    }

    #[test]
    fn every_portal_has_a_status_table() {
        for kind in PortalKind::ALL {
            let engine = normalizer_for(kind);
            assert_eq!(engine.portal(), kind);
            assert!(!engine.statuses().is_empty(), "{kind} has no statuses");
        }
    }
}
