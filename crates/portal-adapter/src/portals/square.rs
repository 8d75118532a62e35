use std::sync::Arc;

use async_trait::async_trait;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, DisputeFields, DisputeFilter, DisputePage,
    EvidencePackage, HealthReport, PortalKind, PortalResult, ReceiptKind, ResponseData,
    StatusSnapshot, WebhookConfig, WebhookEvent, WebhookSubscription,
};
use http::{HeaderMap, HeaderName, Method};
use normalization::{NormalizationEngine, ReasonTable, StatusTable};
use portal_auth::StaticKeyHeader;
use portal_net::Body;
use serde_json::{json, Value};
use tracing::debug;
use webhook_verifier::{HmacAlgorithm, SignatureScheme, WebhookVerifier};

use crate::adapter::{PortalAdapter, WebhookBody};
use crate::config::{resolve_base_url, SquareSettings};
use crate::extract::{brand_at, datetime_at, minor_units_at, raw_at, required_str, str_at};
use crate::portals::{array_at, health_via, into_page, normalize_item, path_id, snapshot};
use crate::runtime::{AdapterContext, IdempotencyPlacement, PortalRuntime};

const DISPUTES_PATH: &str = "/v2/disputes";

pub fn normalizer() -> NormalizationEngine {
    use chargeguard_core_types::CanonicalStatus::*;
    use chargeguard_core_types::ReasonCategory::*;
    NormalizationEngine::new(
        PortalKind::Square,
        StatusTable::new(&[
            ("INQUIRY_EVIDENCE_REQUIRED", Pending),
            ("INQUIRY_PROCESSING", InReview),
            ("INQUIRY_CLOSED", Resolved),
            ("EVIDENCE_REQUIRED", Pending),
            ("PROCESSING", Submitted),
            ("WON", Won),
            ("LOST", Lost),
            ("ACCEPTED", Lost),
        ]),
        ReasonTable::new(&[
            ("NO_KNOWLEDGE", Fraud, "Cardholder does not recognize the charge"),
            ("EMV_LIABILITY_SHIFT", Fraud, "EMV liability shift"),
            ("AMOUNT_DIFFERS", ProcessingError, "Amount differs"),
            ("DUPLICATE", ProcessingError, "Duplicate charge"),
            ("PAID_BY_OTHER_MEANS", ProcessingError, "Paid by other means"),
            ("CANCELLED", ConsumerDispute, "Cancelled"),
            ("NOT_AS_DESCRIBED", ConsumerDispute, "Not as described"),
            ("NOT_RECEIVED", ConsumerDispute, "Not received"),
            ("CUSTOMER_REQUESTS_CREDIT", ConsumerDispute, "Customer requests credit"),
        ]),
    )
}

fn dispute_fields(value: &Value) -> PortalResult<DisputeFields> {
    let currency = required_str(value, "/amount_money/currency")?;
    Ok(DisputeFields {
        dispute_id: required_str(value, "/id")?,
        case_number: str_at(value, "/brand_dispute_id"),
        amount: minor_units_at(value, "/amount_money/amount", &currency)?,
        currency,
        card_last_four: None,
        card_brand: brand_at(value, "/card_brand"),
        counterparty_name: None,
        reason_code: required_str(value, "/reason")?,
        dispute_date: datetime_at(value, "/created_at"),
        due_date: datetime_at(value, "/due_at"),
        portal_status: required_str(value, "/state")?,
    })
}

/// One `evidence-text` upload per narrative, field and linked document.
fn text_evidence(evidence: &EvidencePackage) -> Vec<(String, String)> {
    let mut items = Vec::new();
    if let Some(narrative) = &evidence.narrative {
        items.push(("REBUTTAL_EXPLANATION".to_string(), narrative.clone()));
    }
    for (kind, text) in &evidence.fields {
        items.push((kind.to_ascii_uppercase(), text.clone()));
    }
    for document in &evidence.documents {
        if let Some(url) = &document.url {
            items.push((
                document.kind.to_ascii_uppercase(),
                format!("{}: {url}", document.file_name),
            ));
        }
    }
    items
}

/// A merchant response is a single rebuttal text attached to the dispute.
fn rebuttal_text(response: &ResponseData) -> String {
    let mut text = response
        .note
        .clone()
        .unwrap_or_else(|| format!("Merchant response: {}", response.outcome.as_str()));
    if let Some(amount) = response.refund_amount {
        text.push_str(&format!(" (refund {amount})"));
    }
    text
}

/// Square disputes. Idempotency keys travel in the JSON body.
pub struct SquareAdapter {
    runtime: PortalRuntime,
    square_version: String,
}

impl SquareAdapter {
    pub fn new(settings: &SquareSettings, context: &AdapterContext) -> PortalResult<Self> {
        let base_url = resolve_base_url(PortalKind::Square, settings.base_url.as_deref())?;
        let auth = StaticKeyHeader::bearer(&settings.access_token)?
            .with_header("square-version", &settings.square_version)?;
        let verifier = WebhookVerifier::new(
            SignatureScheme::UrlBodyHmacBase64 {
                header: HeaderName::from_static("x-square-hmacsha256-signature"),
                algorithm: HmacAlgorithm::Sha256,
                url_header: None,
                notification_url: settings.notification_url.clone(),
            },
            settings.signature_key.clone(),
            context.clock.clone(),
        );
        let runtime = PortalRuntime::new(context, base_url, Arc::new(auth), normalizer())
            .with_idempotency(IdempotencyPlacement::BodyField("idempotency_key"))
            .with_verifier(verifier);
        Ok(Self {
            runtime,
            square_version: settings.square_version.clone(),
        })
    }

    fn normalize_envelope(&self, body: &Value) -> PortalResult<CanonicalDispute> {
        let raw = raw_at(body, "/dispute")?;
        self.runtime.normalizer().normalize_raw(raw, dispute_fields)
    }
}

#[async_trait]
impl PortalAdapter for SquareAdapter {
    fn portal(&self) -> PortalKind {
        PortalKind::Square
    }

    async fn authenticate(&self) -> PortalResult<AuthStatus> {
        let probe = self.runtime.request(Method::GET, "/v2/locations")?;
        self.runtime.probe_auth(probe).await
    }

    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute> {
        self.runtime.normalizer().normalize_dispute(raw, dispute_fields)
    }

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot> {
        let path = format!("{DISPUTES_PATH}/{}", path_id(dispute_id)?);
        let response = self.runtime.get("get_dispute_status", &path, &[]).await?;
        Ok(snapshot(self.normalize_envelope(&response.json()?)?))
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage> {
        let mut query = Vec::new();
        if let Some(cursor) = &filter.cursor {
            query.push(("cursor", cursor.clone()));
        }
        if let Some(state) = filter
            .status
            .and_then(|status| self.runtime.normalizer().statuses().portal_status_for(status))
        {
            query.push(("states", state.to_string()));
        }
        let response = self.runtime.get("list_disputes", DISPUTES_PATH, &query).await?;
        let body = response.json()?;

        let items = array_at(&body, "/disputes")?;
        let mut disputes = Vec::with_capacity(items.len());
        for item in items {
            disputes.push(normalize_item(self.runtime.normalizer(), item, dispute_fields)?);
        }
        let next_cursor = str_at(&body, "/cursor");
        Ok(into_page(filter, disputes, next_cursor.is_some(), next_cursor))
    }

    /// Uploads each text item under `{key}-{n}`, then submits the dispute
    /// under `{key}-submit`, so a retried call never duplicates an upload.
    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidencePackage,
    ) -> PortalResult<ActionReceipt> {
        let id = path_id(dispute_id)?;
        let payload = serde_json::to_value(evidence)?;
        self.runtime
            .mutate(ReceiptKind::EvidenceSubmitted, dispute_id, &payload, |key| async move {
                let upload_path = format!("{DISPUTES_PATH}/{id}/evidence-text");
                let mut last_evidence_id = None;
                for (n, (evidence_type, text)) in text_evidence(evidence).into_iter().enumerate() {
                    let response = self
                        .runtime
                        .send_mutation(
                            "submit_evidence",
                            Method::POST,
                            &upload_path,
                            Body::Json(json!({
                                "evidence_type": evidence_type,
                                "evidence_text": text,
                            })),
                            &format!("{key}-{n}"),
                        )
                        .await?;
                    last_evidence_id = str_at(&response.json()?, "/evidence/id");
                    debug!(portal = "square", dispute_id, item = n, "evidence text uploaded");
                }

                let response = self
                    .runtime
                    .send_mutation(
                        "submit_evidence",
                        Method::POST,
                        &format!("{DISPUTES_PATH}/{id}/submit-evidence"),
                        Body::Empty,
                        &format!("{key}-submit"),
                    )
                    .await?;
                let body = response.json()?;
                let state = str_at(&body, "/dispute/state").unwrap_or_else(|| "PROCESSING".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::EvidenceSubmitted,
                    dispute_id,
                    key,
                    last_evidence_id,
                    &state,
                ))
            })
            .await
    }

    async fn push_response(
        &self,
        dispute_id: &str,
        response: &ResponseData,
    ) -> PortalResult<ActionReceipt> {
        let path = format!("{DISPUTES_PATH}/{}/evidence-text", path_id(dispute_id)?);
        let payload = serde_json::to_value(response)?;
        self.runtime
            .mutate(ReceiptKind::ResponsePushed, dispute_id, &payload, |key| async move {
                let reply = self
                    .runtime
                    .send_mutation(
                        "push_response",
                        Method::POST,
                        &path,
                        Body::Json(json!({
                            "evidence_type": "REBUTTAL_EXPLANATION",
                            "evidence_text": rebuttal_text(response),
                        })),
                        &key,
                    )
                    .await?;
                let body = reply.json()?;
                Ok(self.runtime.receipt(
                    ReceiptKind::ResponsePushed,
                    dispute_id,
                    key,
                    str_at(&body, "/evidence/id"),
                    "EVIDENCE_REQUIRED",
                ))
            })
            .await
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt> {
        let path = format!("{DISPUTES_PATH}/{}/accept", path_id(dispute_id)?);
        self.runtime
            .mutate(ReceiptKind::DisputeAccepted, dispute_id, &Value::Null, |key| async move {
                let response = self
                    .runtime
                    .send_mutation("accept_dispute", Method::POST, &path, Body::Empty, &key)
                    .await?;
                let body = response.json()?;
                let state = str_at(&body, "/dispute/state").unwrap_or_else(|| "ACCEPTED".into());
                Ok(self
                    .runtime
                    .receipt(ReceiptKind::DisputeAccepted, dispute_id, key, None, &state))
            })
            .await
    }

    async fn parse_webhook_payload(
        &self,
        headers: &HeaderMap,
        body: WebhookBody,
    ) -> PortalResult<WebhookEvent> {
        let verified = self.runtime.verify_webhook(headers, body)?;
        let value = &verified.value;
        let event = required_str(value, "/type")?;
        let webhook_id = required_str(value, "/event_id")?;
        let timestamp =
            datetime_at(value, "/created_at").unwrap_or_else(|| self.runtime.clock().now());
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let dispute = if str_at(value, "/data/type").as_deref() == Some("dispute") {
            let raw = raw_at(value, "/data/object/dispute")?;
            Some(self.runtime.normalizer().normalize_raw(raw, dispute_fields)?)
        } else {
            None
        };
        Ok(WebhookEvent::new(
            PortalKind::Square,
            event,
            webhook_id,
            timestamp,
            data,
            verified.verification,
            dispute,
            verified.raw,
        ))
    }

    /// Square mints the signature key itself and returns it once.
    async fn register_webhook(&self, config: &WebhookConfig) -> PortalResult<WebhookSubscription> {
        let events = if config.events.is_empty() {
            vec!["dispute.created".to_string(), "dispute.state.updated".to_string()]
        } else {
            config.events.clone()
        };
        let body = json!({
            "subscription": {
                "name": config.description.as_deref().unwrap_or("chargeguard disputes"),
                "event_types": events,
                "notification_url": config.url,
                "api_version": self.square_version,
            }
        });
        let key = self.runtime.idempotency_key("webhook");
        let response = self
            .runtime
            .send_mutation(
                "register_webhook",
                Method::POST,
                "/v2/webhooks/subscriptions",
                Body::Json(body),
                &key,
            )
            .await?;
        let reply = response.json()?;
        let id = required_str(&reply, "/subscription/id")?;
        Ok(self
            .runtime
            .subscription(config, id, str_at(&reply, "/subscription/signature_key")))
    }

    async fn health_check(&self) -> HealthReport {
        health_via(&self.runtime, self.runtime.request(Method::GET, "/v2/locations")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargeguard_core_types::EvidenceDocument;

    #[test]
    fn text_evidence_covers_narrative_fields_and_linked_documents() {
        let mut evidence = EvidencePackage {
            narrative: Some("Delivered on time".into()),
            ..Default::default()
        };
        evidence
            .fields
            .insert("tracking_number".into(), "1Z999".into());
        evidence.documents.push(EvidenceDocument {
            kind: "proof_of_delivery".into(),
            file_name: "pod.pdf".into(),
            content_type: "application/pdf".into(),
            portal_file_id: None,
            content_base64: None,
            url: Some("https://files.example/pod.pdf".into()),
        });
        let items = text_evidence(&evidence);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].0, "REBUTTAL_EXPLANATION");
        assert_eq!(items[1], ("TRACKING_NUMBER".into(), "1Z999".into()));
        assert_eq!(items[2].1, "pod.pdf: https://files.example/pod.pdf");
    }
}
