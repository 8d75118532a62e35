use std::sync::Arc;

use async_trait::async_trait;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, CardBrand, DisputeFields, DisputeFilter,
    DisputePage, EvidencePackage, HealthReport, PortalError, PortalKind, PortalResult,
    ReceiptKind, ResponseData, StatusSnapshot, WebhookEvent,
};
use http::{HeaderMap, Method};
use normalization::{NormalizationEngine, ReasonTable, StatusTable};
use portal_auth::{OAuth1Credential, OAuth1SignatureMethod, OAuth1SigningPerRequest};
use portal_net::Body;
use serde_json::{json, Value};

use crate::adapter::{PortalAdapter, WebhookBody};
use crate::config::{resolve_base_url, MastercomSettings};
use crate::extract::{datetime_at, decimal_at, last_four, required_str, str_at};
use crate::portals::{array_at, health_via, into_page, normalize_item, path_id, snapshot};
use crate::runtime::{AdapterContext, PortalRuntime};

const CLAIMS_PATH: &str = "/v6/claims";

/// Mastercom only carries Mastercard claims, so reason codes resolve through
/// the network table rather than a portal table.
pub fn normalizer() -> NormalizationEngine {
    use chargeguard_core_types::CanonicalStatus::*;
    NormalizationEngine::new(
        PortalKind::Mastercom,
        StatusTable::new(&[
            ("OPEN", Pending),
            ("FIRST_CHARGEBACK", Pending),
            ("REPRESENTMENT", Submitted),
            ("PRE_ARBITRATION", InReview),
            ("ARBITRATION", InReview),
            ("WON", Won),
            ("LOST", Lost),
            ("ACCEPTED", Lost),
            ("EXPIRED", Expired),
            ("CLOSED", Resolved),
        ]),
        ReasonTable::default(),
    )
}

fn dispute_fields(value: &Value) -> PortalResult<DisputeFields> {
    Ok(DisputeFields {
        dispute_id: required_str(value, "/claimId")?,
        case_number: str_at(value, "/chargebackId"),
        amount: decimal_at(value, "/disputedAmount")?,
        currency: required_str(value, "/currency")?,
        card_last_four: str_at(value, "/primaryAccountNum").and_then(|pan| last_four(&pan)),
        card_brand: Some(CardBrand::Mastercard),
        counterparty_name: str_at(value, "/merchantName"),
        reason_code: required_str(value, "/reasonCode")?,
        dispute_date: datetime_at(value, "/openDate"),
        due_date: datetime_at(value, "/dueDate"),
        portal_status: required_str(value, "/claimStatus")?,
    })
}

fn signature_method(settings: &MastercomSettings) -> PortalResult<OAuth1SignatureMethod> {
    match settings.signature_method.as_deref().map(str::trim) {
        None | Some("") => Ok(OAuth1SignatureMethod::RsaSha256),
        Some(method) if method.eq_ignore_ascii_case("RSA-SHA256") => {
            Ok(OAuth1SignatureMethod::RsaSha256)
        }
        Some(method) if method.eq_ignore_ascii_case("HMAC-SHA256") => {
            Ok(OAuth1SignatureMethod::HmacSha256)
        }
        Some(method) if method.eq_ignore_ascii_case("HMAC-SHA512") => {
            Ok(OAuth1SignatureMethod::HmacSha512)
        }
        Some(other) => Err(PortalError::Configuration(format!(
            "unsupported mastercom signature method {other}"
        ))),
    }
}

fn representment_body(evidence: &EvidencePackage) -> Value {
    let documents: Vec<Value> = evidence
        .documents
        .iter()
        .map(|document| {
            json!({
                "fileName": document.file_name,
                "contentType": document.content_type,
                "documentType": document.kind,
                "content": document.content_base64,
                "url": document.url,
            })
        })
        .collect();
    json!({
        "memo": evidence.narrative,
        "fields": evidence.fields,
        "documents": documents,
    })
}

/// Mastercard's Mastercom claims API. Poll-only: no webhooks are offered.
pub struct MastercomAdapter {
    runtime: PortalRuntime,
}

impl MastercomAdapter {
    pub fn new(settings: &MastercomSettings, context: &AdapterContext) -> PortalResult<Self> {
        let base_url = resolve_base_url(PortalKind::Mastercom, settings.base_url.as_deref())?;
        let credential = OAuth1Credential {
            consumer_key: settings.consumer_key.clone(),
            signing_key: settings.signing_key.clone(),
            token: None,
            token_secret: None,
            signature_method: signature_method(settings)?,
        };
        let auth = OAuth1SigningPerRequest::new(credential, context.clock.clone())?;
        let runtime = PortalRuntime::new(context, base_url, Arc::new(auth), normalizer());
        Ok(Self { runtime })
    }

    fn claims_probe(&self) -> PortalResult<portal_net::NetRequest> {
        let mut probe = self.runtime.request(Method::GET, CLAIMS_PATH)?;
        probe.url.query_pairs_mut().append_pair("limit", "1");
        Ok(probe)
    }
}

#[async_trait]
impl PortalAdapter for MastercomAdapter {
    fn portal(&self) -> PortalKind {
        PortalKind::Mastercom
    }

    async fn authenticate(&self) -> PortalResult<AuthStatus> {
        self.runtime.probe_auth(self.claims_probe()?).await
    }

    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute> {
        self.runtime.normalizer().normalize_dispute(raw, dispute_fields)
    }

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot> {
        let path = format!("{CLAIMS_PATH}/{}", path_id(dispute_id)?);
        let response = self.runtime.get("get_dispute_status", &path, &[]).await?;
        let dispute = self
            .runtime
            .normalizer()
            .normalize_dispute(&response.text(), dispute_fields)?;
        Ok(snapshot(dispute))
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage> {
        let page = filter.effective_page();
        let limit = filter.effective_limit();
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if let Some(since) = filter.since {
            query.push(("fromDate", since.format("%Y-%m-%d").to_string()));
        }
        let response = self.runtime.get("list_disputes", CLAIMS_PATH, &query).await?;
        let body = response.json()?;

        let items = array_at(&body, "/claims")?;
        let mut disputes = Vec::with_capacity(items.len());
        for item in items {
            disputes.push(normalize_item(self.runtime.normalizer(), item, dispute_fields)?);
        }
        let has_more = match body.get("totalCount").and_then(Value::as_u64) {
            Some(total) => u64::from(page) * u64::from(limit) < total,
            None => items.len() as u64 == u64::from(limit),
        };
        Ok(into_page(filter, disputes, has_more, None))
    }

    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidencePackage,
    ) -> PortalResult<ActionReceipt> {
        let path = format!("{CLAIMS_PATH}/{}/representment", path_id(dispute_id)?);
        let body = representment_body(evidence);
        let payload = &body;
        self.runtime
            .mutate(ReceiptKind::EvidenceSubmitted, dispute_id, payload, |key| async move {
                let response = self
                    .runtime
                    .send_mutation(
                        "submit_evidence",
                        Method::POST,
                        &path,
                        Body::Json(payload.clone()),
                        &key,
                    )
                    .await?;
                let reply = response.json()?;
                let status = str_at(&reply, "/status").unwrap_or_else(|| "REPRESENTMENT".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::EvidenceSubmitted,
                    dispute_id,
                    key,
                    str_at(&reply, "/representmentId"),
                    &status,
                ))
            })
            .await
    }

    async fn push_response(
        &self,
        dispute_id: &str,
        response: &ResponseData,
    ) -> PortalResult<ActionReceipt> {
        let path = format!("{CLAIMS_PATH}/{}/memo", path_id(dispute_id)?);
        let body = json!({
            "outcome": response.outcome.as_str().to_ascii_uppercase(),
            "memo": response.note,
            "refundAmount": response.refund_amount.map(|amount| amount.to_string()),
            "fields": response.fields,
        });
        let payload = &body;
        self.runtime
            .mutate(ReceiptKind::ResponsePushed, dispute_id, payload, |key| async move {
                let reply = self
                    .runtime
                    .send_mutation(
                        "push_response",
                        Method::POST,
                        &path,
                        Body::Json(payload.clone()),
                        &key,
                    )
                    .await?
                    .json()?;
                let status = str_at(&reply, "/status").unwrap_or_else(|| "OPEN".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::ResponsePushed,
                    dispute_id,
                    key,
                    str_at(&reply, "/memoId"),
                    &status,
                ))
            })
            .await
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt> {
        let path = format!("{CLAIMS_PATH}/{}/accept", path_id(dispute_id)?);
        self.runtime
            .mutate(ReceiptKind::DisputeAccepted, dispute_id, &Value::Null, |key| async move {
                let response = self
                    .runtime
                    .send_mutation("accept_dispute", Method::POST, &path, Body::Json(json!({})), &key)
                    .await?;
                let reply = response.json()?;
                let status = str_at(&reply, "/status").unwrap_or_else(|| "ACCEPTED".into());
                Ok(self
                    .runtime
                    .receipt(ReceiptKind::DisputeAccepted, dispute_id, key, None, &status))
            })
            .await
    }

    async fn parse_webhook_payload(
        &self,
        _headers: &HeaderMap,
        _body: WebhookBody,
    ) -> PortalResult<WebhookEvent> {
        Err(PortalError::Unsupported {
            portal: PortalKind::Mastercom,
            operation: "parse_webhook_payload",
        })
    }

    async fn health_check(&self) -> HealthReport {
        health_via(&self.runtime, self.claims_probe()).await
    }
}
