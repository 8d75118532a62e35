use std::sync::Arc;

use async_trait::async_trait;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, DisputeFields, DisputeFilter, DisputePage,
    EvidencePackage, HealthReport, PortalKind, PortalResult, ReceiptKind, ResponseData,
    StatusSnapshot, WebhookConfig, WebhookEvent, WebhookSubscription,
};
use http::{HeaderMap, HeaderName, Method};
use normalization::{NormalizationEngine, ReasonTable, StatusTable};
use portal_auth::{OAuth2ClientCredentials, OAuth2Credential, TokenRequestAuth};
use portal_net::Body;
use serde_json::{json, Value};
use url::Url;
use webhook_verifier::{HmacAlgorithm, SignatureScheme, WebhookVerifier};

use crate::adapter::{PortalAdapter, WebhookBody};
use crate::config::{resolve_base_url, PaypalSettings};
use crate::extract::{datetime_at, decimal_at, raw_at, required_str, str_at};
use crate::portals::{array_at, health_via, into_page, normalize_item, path_id, snapshot};
use crate::runtime::{join_url, AdapterContext, IdempotencyPlacement, PortalRuntime};

const DISPUTES_PATH: &str = "/v1/customer/disputes";

pub fn normalizer() -> NormalizationEngine {
    use chargeguard_core_types::CanonicalStatus::*;
    use chargeguard_core_types::ReasonCategory::*;
    NormalizationEngine::new(
        PortalKind::Paypal,
        StatusTable::new(&[
            ("OPEN", Pending),
            ("WAITING_FOR_SELLER_RESPONSE", Pending),
            ("WAITING_FOR_BUYER_RESPONSE", InReview),
            ("UNDER_REVIEW", InReview),
            ("RESOLVED", Resolved),
            ("OTHER", Pending),
            // outcome codes take precedence once a case is resolved
            ("RESOLVED_SELLER_FAVOUR", Won),
            ("CANCELED_BY_BUYER", Won),
            ("DENIED", Won),
            ("RESOLVED_BUYER_FAVOUR", Lost),
            ("RESOLVED_WITH_PAYOUT", Lost),
            ("ACCEPTED", Lost),
        ]),
        ReasonTable::new(&[
            ("UNAUTHORISED", Fraud, "Unauthorised transaction"),
            ("MERCHANDISE_OR_SERVICE_NOT_RECEIVED", ConsumerDispute, "Item not received"),
            (
                "MERCHANDISE_OR_SERVICE_NOT_AS_DESCRIBED",
                ConsumerDispute,
                "Item not as described",
            ),
            ("CREDIT_NOT_PROCESSED", ConsumerDispute, "Credit not processed"),
            ("CANCELED_RECURRING_BILLING", ConsumerDispute, "Canceled recurring billing"),
            ("DUPLICATE_TRANSACTION", ProcessingError, "Duplicate transaction"),
            ("INCORRECT_AMOUNT", ProcessingError, "Incorrect amount"),
            ("PAYMENT_BY_OTHER_MEANS", ProcessingError, "Paid by other means"),
            ("PROBLEM_WITH_REMITTANCE", ProcessingError, "Problem with remittance"),
        ]),
    )
}

fn dispute_fields(value: &Value) -> PortalResult<DisputeFields> {
    let portal_status = match str_at(value, "/dispute_outcome/outcome_code") {
        Some(outcome) => outcome,
        None => required_str(value, "/status")?,
    };
    Ok(DisputeFields {
        dispute_id: required_str(value, "/dispute_id")?,
        case_number: str_at(value, "/disputed_transactions/0/seller_transaction_id"),
        amount: decimal_at(value, "/dispute_amount/value")?,
        currency: required_str(value, "/dispute_amount/currency_code")?,
        card_last_four: None,
        card_brand: None,
        counterparty_name: str_at(value, "/disputed_transactions/0/buyer/name"),
        reason_code: required_str(value, "/reason")?,
        dispute_date: datetime_at(value, "/create_time"),
        due_date: datetime_at(value, "/seller_response_due_date"),
        portal_status,
    })
}

fn evidence_body(evidence: &EvidencePackage) -> Value {
    let mut evidences: Vec<Value> = evidence
        .fields
        .iter()
        .map(|(kind, notes)| json!({ "evidence_type": kind.to_ascii_uppercase(), "notes": notes }))
        .collect();
    evidences.extend(evidence.documents.iter().map(|document| {
        json!({
            "evidence_type": document.kind.to_ascii_uppercase(),
            "documents": [{ "name": document.file_name, "url": document.url }],
        })
    }));
    let mut body = json!({ "evidences": evidences });
    if let Some(narrative) = &evidence.narrative {
        body["note"] = json!(narrative);
    }
    body
}

/// `next_page_token` of the `rel=next` HATEOAS link, if any.
fn next_page_token(body: &Value) -> Option<String> {
    let links = body.get("links")?.as_array()?;
    let href = links
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))?
        .get("href")?
        .as_str()?;
    let url = Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "next_page_token")
        .map(|(_, value)| value.into_owned())
}

/// PayPal Resolution Center. Tokens come from the client-credentials grant.
pub struct PaypalAdapter {
    runtime: PortalRuntime,
}

impl PaypalAdapter {
    pub fn new(settings: &PaypalSettings, context: &AdapterContext) -> PortalResult<Self> {
        let base_url = resolve_base_url(PortalKind::Paypal, settings.base_url.as_deref())?;
        let credential = OAuth2Credential {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            token_url: join_url(&base_url, "/v1/oauth2/token")?,
            scope: None,
            token_auth: TokenRequestAuth::Basic,
        };
        let auth = OAuth2ClientCredentials::new(
            credential,
            context.transport.clone(),
            context.clock.clone(),
        )?
        .with_timeout(context.timeout);
        let verifier = WebhookVerifier::new(
            SignatureScheme::raw_hex("paypal-transmission-sig", HmacAlgorithm::Sha256),
            settings.webhook_secret.clone(),
            context.clock.clone(),
        );
        let runtime = PortalRuntime::new(context, base_url, Arc::new(auth), normalizer())
            .with_idempotency(IdempotencyPlacement::Header(HeaderName::from_static(
                "paypal-request-id",
            )))
            .with_verifier(verifier);
        Ok(Self { runtime })
    }

    async fn post_action(
        &self,
        kind: ReceiptKind,
        operation: &'static str,
        dispute_id: &str,
        action: &str,
        body: Value,
        settled_status: &'static str,
    ) -> PortalResult<ActionReceipt> {
        let path = format!("{DISPUTES_PATH}/{}/{action}", path_id(dispute_id)?);
        let payload = &body;
        self.runtime
            .mutate(kind, dispute_id, payload, |key| async move {
                let response = self
                    .runtime
                    .send_mutation(operation, Method::POST, &path, Body::Json(payload.clone()), &key)
                    .await?;
                let reply = response.json()?;
                let status = str_at(&reply, "/status").unwrap_or_else(|| settled_status.to_string());
                Ok(self
                    .runtime
                    .receipt(kind, dispute_id, key, str_at(&reply, "/id"), &status))
            })
            .await
    }
}

#[async_trait]
impl PortalAdapter for PaypalAdapter {
    fn portal(&self) -> PortalKind {
        PortalKind::Paypal
    }

    async fn authenticate(&self) -> PortalResult<AuthStatus> {
        let mut probe = self.runtime.request(Method::GET, DISPUTES_PATH)?;
        probe.url.query_pairs_mut().append_pair("page_size", "1");
        self.runtime.probe_auth(probe).await
    }

    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute> {
        self.runtime.normalizer().normalize_dispute(raw, dispute_fields)
    }

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot> {
        let path = format!("{DISPUTES_PATH}/{}", path_id(dispute_id)?);
        let response = self.runtime.get("get_dispute_status", &path, &[]).await?;
        let dispute = self
            .runtime
            .normalizer()
            .normalize_dispute(&response.text(), dispute_fields)?;
        Ok(snapshot(dispute))
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage> {
        let mut query = vec![("page_size", filter.effective_limit().to_string())];
        if let Some(token) = &filter.cursor {
            query.push(("next_page_token", token.clone()));
        }
        if let Some(since) = filter.since {
            query.push(("start_time", since.to_rfc3339()));
        }
        let response = self.runtime.get("list_disputes", DISPUTES_PATH, &query).await?;
        let body = response.json()?;

        let items = array_at(&body, "/items")?;
        let mut disputes = Vec::with_capacity(items.len());
        for item in items {
            disputes.push(normalize_item(self.runtime.normalizer(), item, dispute_fields)?);
        }
        let next_cursor = next_page_token(&body);
        Ok(into_page(filter, disputes, next_cursor.is_some(), next_cursor))
    }

    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidencePackage,
    ) -> PortalResult<ActionReceipt> {
        self.post_action(
            ReceiptKind::EvidenceSubmitted,
            "submit_evidence",
            dispute_id,
            "provide-evidence",
            evidence_body(evidence),
            "UNDER_REVIEW",
        )
        .await
    }

    async fn push_response(
        &self,
        dispute_id: &str,
        response: &ResponseData,
    ) -> PortalResult<ActionReceipt> {
        let message = response
            .note
            .clone()
            .unwrap_or_else(|| format!("Merchant response: {}", response.outcome.as_str()));
        self.post_action(
            ReceiptKind::ResponsePushed,
            "push_response",
            dispute_id,
            "send-message",
            json!({ "message": message }),
            "WAITING_FOR_BUYER_RESPONSE",
        )
        .await
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt> {
        self.post_action(
            ReceiptKind::DisputeAccepted,
            "accept_dispute",
            dispute_id,
            "accept-claim",
            json!({ "note": "Liability accepted by merchant" }),
            "ACCEPTED",
        )
        .await
    }

    async fn parse_webhook_payload(
        &self,
        headers: &HeaderMap,
        body: WebhookBody,
    ) -> PortalResult<WebhookEvent> {
        let verified = self.runtime.verify_webhook(headers, body)?;
        let value = &verified.value;
        let event = required_str(value, "/event_type")?;
        let webhook_id = required_str(value, "/id")?;
        let timestamp =
            datetime_at(value, "/create_time").unwrap_or_else(|| self.runtime.clock().now());
        let data = value.get("resource").cloned().unwrap_or(Value::Null);
        let dispute = if str_at(value, "/resource/dispute_id").is_some() {
            let raw = raw_at(value, "/resource")?;
            Some(self.runtime.normalizer().normalize_raw(raw, dispute_fields)?)
        } else {
            None
        };
        Ok(WebhookEvent::new(
            PortalKind::Paypal,
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
        let events: Vec<Value> = if config.events.is_empty() {
            vec![json!({ "name": "CUSTOMER.DISPUTE.*" })]
        } else {
            config.events.iter().map(|name| json!({ "name": name })).collect()
        };
        let key = self.runtime.idempotency_key("webhook");
        let response = self
            .runtime
            .send_mutation(
                "register_webhook",
                Method::POST,
                "/v1/notifications/webhooks",
                Body::Json(json!({ "url": config.url, "event_types": events })),
                &key,
            )
            .await?;
        let body = response.json()?;
        let id = required_str(&body, "/id")?;
        Ok(self.runtime.subscription(config, id, None))
    }

    async fn health_check(&self) -> HealthReport {
        let probe = self.runtime.request(Method::GET, DISPUTES_PATH).map(|mut probe| {
            probe.url.query_pairs_mut().append_pair("page_size", "1");
            probe
        });
        health_via(&self.runtime, probe).await
    }
}
