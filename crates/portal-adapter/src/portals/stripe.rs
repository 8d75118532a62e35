use std::sync::Arc;

use async_trait::async_trait;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, DisputeFields, DisputeFilter, DisputePage,
    EvidencePackage, HealthReport, PortalKind, PortalResult, ReceiptKind, ResponseData,
    StatusSnapshot, WebhookConfig, WebhookEvent, WebhookSubscription,
};
use http::{HeaderMap, Method};
use normalization::{NormalizationEngine, ReasonTable, StatusTable};
use portal_auth::BasicEmptyPassword;
use portal_net::Body;
use serde_json::Value;
use tracing::warn;
use webhook_verifier::{SignatureScheme, WebhookVerifier};

use crate::adapter::{PortalAdapter, WebhookBody};
use crate::config::{resolve_base_url, StripeSettings};
use crate::extract::{brand_at, minor_units_at, raw_at, required_str, str_at, unix_at};
use crate::portals::{array_at, health_via, into_page, normalize_item, path_id, snapshot};
use crate::runtime::{AdapterContext, PortalRuntime};

pub const DEFAULT_API_VERSION: &str = "2023-10-16";
const DISPUTE_EVENTS: [&str; 4] = [
    "charge.dispute.created",
    "charge.dispute.updated",
    "charge.dispute.closed",
    "charge.dispute.funds_withdrawn",
];

pub fn normalizer() -> NormalizationEngine {
    use chargeguard_core_types::CanonicalStatus::*;
    use chargeguard_core_types::ReasonCategory::*;
    NormalizationEngine::new(
        PortalKind::Stripe,
        StatusTable::new(&[
            ("warning_needs_response", Pending),
            ("warning_under_review", InReview),
            ("warning_closed", Resolved),
            ("needs_response", Pending),
            ("under_review", InReview),
            ("won", Won),
            ("lost", Lost),
            ("charge_refunded", Resolved),
        ]),
        ReasonTable::new(&[
            ("fraudulent", Fraud, "Fraudulent"),
            ("unrecognized", Fraud, "Unrecognized"),
            ("debit_not_authorized", Fraud, "Debit not authorized"),
            ("duplicate", ProcessingError, "Duplicate"),
            ("incorrect_account_details", ProcessingError, "Incorrect account details"),
            ("bank_cannot_process", ProcessingError, "Bank cannot process"),
            ("insufficient_funds", Authorization, "Insufficient funds"),
            ("check_returned", Authorization, "Check returned"),
            ("subscription_canceled", ConsumerDispute, "Subscription canceled"),
            ("product_unacceptable", ConsumerDispute, "Product unacceptable"),
            ("product_not_received", ConsumerDispute, "Product not received"),
            ("credit_not_processed", ConsumerDispute, "Credit not processed"),
            ("customer_initiated", ConsumerDispute, "Customer initiated"),
        ]),
    )
}

fn dispute_fields(value: &Value) -> PortalResult<DisputeFields> {
    let currency = required_str(value, "/currency")?;
    Ok(DisputeFields {
        dispute_id: required_str(value, "/id")?,
        // `case_type` is chargeback/inquiry; Stripe exposes no network case reference
        case_number: None,
        amount: minor_units_at(value, "/amount", &currency)?,
        currency,
        card_last_four: str_at(value, "/payment_method_details/card/last4"),
        card_brand: brand_at(value, "/payment_method_details/card/brand"),
        counterparty_name: str_at(value, "/evidence/customer_name"),
        reason_code: required_str(value, "/reason")?,
        dispute_date: unix_at(value, "/created"),
        due_date: unix_at(value, "/evidence_details/due_by"),
        portal_status: required_str(value, "/status")?,
    })
}

/// `evidence[..]` form fields; documents must already be uploaded to Stripe.
fn evidence_form(evidence: &EvidencePackage) -> Vec<(String, String)> {
    let mut form = Vec::new();
    if let Some(narrative) = &evidence.narrative {
        form.push(("evidence[uncategorized_text]".to_string(), narrative.clone()));
    }
    for (key, value) in &evidence.fields {
        form.push((format!("evidence[{key}]"), value.clone()));
    }
    for document in &evidence.documents {
        match &document.portal_file_id {
            Some(file_id) => form.push((format!("evidence[{}]", document.kind), file_id.clone())),
            None => warn!(
                portal = "stripe",
                file_name = %document.file_name,
                "document without an uploaded file id skipped"
            ),
        }
    }
    form.push(("submit".to_string(), "true".to_string()));
    form
}

/// Stages a merchant response on the dispute without submitting it. The outcome
/// and caller fields land in `metadata`; the note becomes the narrative.
fn response_form(response: &ResponseData) -> Vec<(String, String)> {
    let mut form = vec![(
        "metadata[response_outcome]".to_string(),
        response.outcome.as_str().to_string(),
    )];
    if let Some(note) = &response.note {
        form.push(("evidence[uncategorized_text]".to_string(), note.clone()));
    }
    if let Some(amount) = response.refund_amount {
        form.push(("metadata[refund_amount]".to_string(), amount.to_string()));
    }
    for (key, value) in &response.fields {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form.push(("submit".to_string(), "false".to_string()));
    form
}

/// Card payments via Stripe's disputes API. Amounts arrive in minor units.
pub struct StripeAdapter {
    runtime: PortalRuntime,
}

impl StripeAdapter {
    pub fn new(settings: &StripeSettings, context: &AdapterContext) -> PortalResult<Self> {
        let base_url = resolve_base_url(PortalKind::Stripe, settings.base_url.as_deref())?;
        let auth = Arc::new(BasicEmptyPassword::new(&settings.api_key)?);
        let verifier = WebhookVerifier::new(
            SignatureScheme::timestamped("stripe-signature"),
            settings.webhook_secret.clone(),
            context.clock.clone(),
        );
        let api_version = settings.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION);
        let runtime = PortalRuntime::new(context, base_url, auth, normalizer())
            .with_verifier(verifier)
            .with_default_header("stripe-version", api_version)?;
        Ok(Self { runtime })
    }
}

#[async_trait]
impl PortalAdapter for StripeAdapter {
    fn portal(&self) -> PortalKind {
        PortalKind::Stripe
    }

    async fn authenticate(&self) -> PortalResult<AuthStatus> {
        let probe = self.runtime.request(Method::GET, "/v1/balance")?;
        self.runtime.probe_auth(probe).await
    }

    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute> {
        self.runtime.normalizer().normalize_dispute(raw, dispute_fields)
    }

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot> {
        let path = format!("/v1/disputes/{}", path_id(dispute_id)?);
        let response = self.runtime.get("get_dispute_status", &path, &[]).await?;
        let dispute = self
            .runtime
            .normalizer()
            .normalize_dispute(&response.text(), dispute_fields)?;
        Ok(snapshot(dispute))
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage> {
        let mut query = vec![("limit", filter.effective_limit().to_string())];
        if let Some(cursor) = &filter.cursor {
            query.push(("starting_after", cursor.clone()));
        }
        if let Some(since) = filter.since {
            query.push(("created[gte]", since.timestamp().to_string()));
        }
        let response = self.runtime.get("list_disputes", "/v1/disputes", &query).await?;
        let body = response.json()?;

        let items = array_at(&body, "/data")?;
        let mut disputes = Vec::with_capacity(items.len());
        for item in items {
            disputes.push(normalize_item(self.runtime.normalizer(), item, dispute_fields)?);
        }
        let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        let next_cursor = has_more
            .then(|| disputes.last().map(|d| d.dispute_id.clone()))
            .flatten();
        Ok(into_page(filter, disputes, has_more, next_cursor))
    }

    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidencePackage,
    ) -> PortalResult<ActionReceipt> {
        let path = format!("/v1/disputes/{}", path_id(dispute_id)?);
        let payload = serde_json::to_value(evidence)?;
        self.runtime
            .mutate(ReceiptKind::EvidenceSubmitted, dispute_id, &payload, |key| async move {
                let response = self
                    .runtime
                    .send_mutation(
                        "submit_evidence",
                        Method::POST,
                        &path,
                        Body::Form(evidence_form(evidence)),
                        &key,
                    )
                    .await?;
                let body = response.json()?;
                let status = str_at(&body, "/status").unwrap_or_else(|| "under_review".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::EvidenceSubmitted,
                    dispute_id,
                    key,
                    str_at(&body, "/id"),
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
        let path = format!("/v1/disputes/{}", path_id(dispute_id)?);
        let payload = serde_json::to_value(response)?;
        self.runtime
            .mutate(ReceiptKind::ResponsePushed, dispute_id, &payload, |key| async move {
                let reply = self
                    .runtime
                    .send_mutation(
                        "push_response",
                        Method::POST,
                        &path,
                        Body::Form(response_form(response)),
                        &key,
                    )
                    .await?;
                let body = reply.json()?;
                let status = str_at(&body, "/status").unwrap_or_else(|| "needs_response".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::ResponsePushed,
                    dispute_id,
                    key,
                    str_at(&body, "/id"),
                    &status,
                ))
            })
            .await
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt> {
        let path = format!("/v1/disputes/{}/close", path_id(dispute_id)?);
        self.runtime
            .mutate(ReceiptKind::DisputeAccepted, dispute_id, &Value::Null, |key| async move {
                let response = self
                    .runtime
                    .send_mutation("accept_dispute", Method::POST, &path, Body::Empty, &key)
                    .await?;
                let body = response.json()?;
                let status = str_at(&body, "/status").unwrap_or_else(|| "lost".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::DisputeAccepted,
                    dispute_id,
                    key,
                    str_at(&body, "/id"),
                    &status,
                ))
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
        let webhook_id = required_str(value, "/id")?;
        let timestamp = unix_at(value, "/created").unwrap_or_else(|| self.runtime.clock().now());
        let data = value.pointer("/data/object").cloned().unwrap_or(Value::Null);
        let dispute = if str_at(value, "/data/object/object").as_deref() == Some("dispute") {
            let raw = raw_at(value, "/data/object")?;
            Some(self.runtime.normalizer().normalize_raw(raw, dispute_fields)?)
        } else {
            None
        };
        Ok(WebhookEvent::new(
            PortalKind::Stripe,
            event,
            webhook_id,
            timestamp,
            data,
            verified.verification,
            dispute,
            verified.raw,
        ))
    }

    async fn register_webhook(&self, config: &WebhookConfig) -> PortalResult<WebhookSubscription> {
        let mut form = vec![("url".to_string(), config.url.clone())];
        if config.events.is_empty() {
            form.extend(DISPUTE_EVENTS.iter().map(|e| ("enabled_events[]".to_string(), e.to_string())));
        } else {
            form.extend(config.events.iter().map(|e| ("enabled_events[]".to_string(), e.clone())));
        }
        if let Some(description) = &config.description {
            form.push(("description".to_string(), description.clone()));
        }
        let key = self.runtime.idempotency_key("webhook");
        let response = self
            .runtime
            .send_mutation(
                "register_webhook",
                Method::POST,
                "/v1/webhook_endpoints",
                Body::Form(form),
                &key,
            )
            .await?;
        let body = response.json()?;
        let id = required_str(&body, "/id")?;
        Ok(self.runtime.subscription(config, id, str_at(&body, "/secret")))
    }

    async fn health_check(&self) -> HealthReport {
        health_via(&self.runtime, self.runtime.request(Method::GET, "/v1/balance")).await
    }
}
