use std::sync::Arc;

use async_trait::async_trait;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, DisputeFields, DisputeFilter, DisputePage,
    EvidencePackage, HealthReport, PortalError, PortalKind, PortalResult, ReceiptKind,
    ResponseData, Secret, StatusSnapshot, WebhookConfig, WebhookEvent, WebhookSubscription,
};
use http::{HeaderMap, HeaderName, Method};
use normalization::{NormalizationEngine, ReasonTable, StatusTable};
use portal_auth::{BodyEmbeddedCredentials, EmbedTarget, StaticKeyHeader};
use portal_net::{Body, NetRequest};
use serde_json::{json, Map, Value};
use tracing::warn;
use webhook_verifier::{HmacAlgorithm, SignatureScheme, WebhookVerifier};

use crate::adapter::{PortalAdapter, WebhookBody};
use crate::config::{resolve_base_url, AuthorizeNetSettings};
use crate::extract::{brand_at, datetime_at, decimal_at, last_four, raw_at, required_str, str_at};
use crate::portals::{array_at, health_via, into_page, normalize_item, path_id, snapshot};
use crate::runtime::{AdapterContext, IdempotencyPlacement, PortalRuntime};

/// Every Authorize.net call goes to this one endpoint; the envelope name
/// selects the operation.
const API_PATH: &str = "/xml/v1/request.api";
/// Webhook management lives on a separate REST surface with Basic auth.
const WEBHOOKS_PATH: &str = "/rest/v1/webhooks";
const DEFAULT_WEBHOOK_EVENTS: [&str; 3] = [
    "net.authorize.payment.fraud.held",
    "net.authorize.payment.fraud.declined",
    "net.authorize.payment.refund.created",
];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// Result code for rejected merchant credentials.
const INVALID_CREDENTIALS: &str = "E00007";

pub fn normalizer() -> NormalizationEngine {
    use chargeguard_core_types::CanonicalStatus::*;
    NormalizationEngine::new(
        PortalKind::AuthorizeNet,
        StatusTable::new(&[
            ("Open", Pending),
            ("UnderReview", InReview),
            ("Responded", Submitted),
            ("Won", Won),
            ("Lost", Lost),
            ("Accepted", Lost),
            ("Expired", Expired),
            ("Closed", Resolved),
        ]),
        ReasonTable::default(),
    )
}

fn dispute_fields(value: &Value) -> PortalResult<DisputeFields> {
    Ok(DisputeFields {
        dispute_id: required_str(value, "/disputeId")?,
        case_number: str_at(value, "/transId"),
        amount: decimal_at(value, "/amount")?,
        currency: str_at(value, "/currencyCode").unwrap_or_else(|| "USD".to_string()),
        card_last_four: str_at(value, "/accountNumber").and_then(|number| last_four(&number)),
        card_brand: brand_at(value, "/cardType"),
        counterparty_name: str_at(value, "/customerName"),
        reason_code: required_str(value, "/reasonCode")?,
        dispute_date: datetime_at(value, "/disputeDate"),
        due_date: datetime_at(value, "/responseDueDate"),
        portal_status: required_str(value, "/disputeStatus")?,
    })
}

fn envelope(request: &str, inner: Value) -> Body {
    let mut root = Map::new();
    root.insert(request.to_string(), inner);
    Body::Json(Value::Object(root))
}

/// Authorize.net answers HTTP 200 for failures too and prefixes its JSON with
/// a UTF-8 BOM, so the outcome lives in `messages.resultCode`.
fn parse_reply(bytes: &[u8]) -> PortalResult<Value> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| PortalError::malformed(format!("authorize.net reply: {err}")))?;
    match str_at(&value, "/messages/resultCode") {
        Some(code) if code.eq_ignore_ascii_case("Ok") => Ok(value),
        Some(_) => {
            let code = str_at(&value, "/messages/message/0/code").unwrap_or_default();
            let text = str_at(&value, "/messages/message/0/text")
                .unwrap_or_else(|| "request failed".to_string());
            let message = format!("{code}: {text}");
            if code == INVALID_CREDENTIALS {
                Err(PortalError::authentication(message))
            } else {
                Err(PortalError::PermanentClient {
                    status: 400,
                    message,
                })
            }
        }
        None => Err(PortalError::malformed("authorize.net reply has no resultCode")),
    }
}

fn evidence_inner(dispute_id: &str, evidence: &EvidencePackage) -> Value {
    let documents: Vec<Value> = evidence
        .documents
        .iter()
        .map(|document| {
            json!({
                "documentType": document.kind,
                "fileName": document.file_name,
                "contentType": document.content_type,
                "fileContent": document.content_base64,
            })
        })
        .collect();
    json!({
        "disputeId": dispute_id,
        "evidence": {
            "narrative": evidence.narrative,
            "fields": evidence.fields,
            "documents": documents,
        },
    })
}

/// Authorize.net: credentials ride inside every request envelope.
pub struct AuthorizeNetAdapter {
    runtime: PortalRuntime,
    webhooks: PortalRuntime,
    signature_key: Option<Secret>,
}

impl AuthorizeNetAdapter {
    pub fn new(settings: &AuthorizeNetSettings, context: &AdapterContext) -> PortalResult<Self> {
        let base_url = resolve_base_url(PortalKind::AuthorizeNet, settings.base_url.as_deref())?;
        let auth = BodyEmbeddedCredentials::new(
            "merchantAuthentication",
            vec![
                ("name".to_string(), settings.api_login_id.clone()),
                ("transactionKey".to_string(), settings.transaction_key.clone()),
            ],
            EmbedTarget::Envelope,
        )?;
        let verifier = WebhookVerifier::new(
            SignatureScheme::RawHmacHex {
                header: HeaderName::from_static("x-anet-signature"),
                algorithm: HmacAlgorithm::Sha512,
                prefix: Some("sha512=".to_string()),
            },
            settings.signature_key.clone(),
            context.clock.clone(),
        );
        let rest_auth =
            StaticKeyHeader::basic(&settings.api_login_id, &settings.transaction_key)?;
        let webhooks =
            PortalRuntime::new(context, base_url.clone(), Arc::new(rest_auth), normalizer());
        let runtime = PortalRuntime::new(context, base_url, Arc::new(auth), normalizer())
            .with_idempotency(IdempotencyPlacement::EnvelopeField("refId"))
            .with_verifier(verifier);
        Ok(Self {
            runtime,
            webhooks,
            signature_key: settings.signature_key.clone(),
        })
    }

    fn probe(&self) -> PortalResult<NetRequest> {
        Ok(self
            .runtime
            .request(Method::POST, API_PATH)?
            .with_body(envelope("authenticateTestRequest", json!({}))))
    }

    async fn call(&self, operation: &str, request: &str, inner: Value) -> PortalResult<Value> {
        let template = self
            .runtime
            .request(Method::POST, API_PATH)?
            .with_body(envelope(request, inner));
        let response = self.runtime.execute(operation, template).await?;
        parse_reply(&response.body)
    }

    async fn call_mutation(
        &self,
        operation: &str,
        request: &str,
        inner: Value,
        idempotency_key: &str,
    ) -> PortalResult<Value> {
        let response = self
            .runtime
            .send_mutation(
                operation,
                Method::POST,
                API_PATH,
                envelope(request, inner),
                idempotency_key,
            )
            .await?;
        parse_reply(&response.body)
    }
}

#[async_trait]
impl PortalAdapter for AuthorizeNetAdapter {
    fn portal(&self) -> PortalKind {
        PortalKind::AuthorizeNet
    }

    /// Rejections arrive inside a 200 reply, so the generic probe cannot tell
    /// them apart from success.
    async fn authenticate(&self) -> PortalResult<AuthStatus> {
        let outcome = match self.runtime.execute("authenticate", self.probe()?).await {
            Ok(response) => parse_reply(&response.body),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(_) => Ok(AuthStatus::ok("authorize_net credentials accepted", None)),
            Err(err @ PortalError::TransientNetwork { .. }) => Err(err),
            Err(err) => {
                warn!(portal = "authorize_net", error = %err, "credential probe rejected");
                Ok(AuthStatus::rejected(err.to_string()))
            }
        }
    }

    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute> {
        self.runtime.normalizer().normalize_dispute(raw, dispute_fields)
    }

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot> {
        let reply = self
            .call(
                "get_dispute_status",
                "getDisputeDetailsRequest",
                json!({ "disputeId": path_id(dispute_id)? }),
            )
            .await?;
        let raw = raw_at(&reply, "/dispute")?;
        let dispute = self.runtime.normalizer().normalize_raw(raw, dispute_fields)?;
        Ok(snapshot(dispute))
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage> {
        let page = filter.effective_page();
        let limit = filter.effective_limit();
        let mut inner = json!({
            "paging": { "limit": limit, "offset": page },
            "sorting": { "orderBy": "disputeDate", "orderDescending": true },
        });
        if let Some(since) = filter.since {
            inner["filter"] = json!({ "fromDate": since.to_rfc3339() });
        }
        let reply = self.call("list_disputes", "getDisputeListRequest", inner).await?;

        let items = array_at(&reply, "/disputes")?;
        let mut disputes = Vec::with_capacity(items.len());
        for item in items {
            disputes.push(normalize_item(self.runtime.normalizer(), item, dispute_fields)?);
        }
        let total = reply
            .get("totalNumInResultSet")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let has_more = u64::from(page) * u64::from(limit) < total;
        Ok(into_page(filter, disputes, has_more, None))
    }

    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidencePackage,
    ) -> PortalResult<ActionReceipt> {
        let inner = evidence_inner(path_id(dispute_id)?, evidence);
        let payload = &inner;
        self.runtime
            .mutate(ReceiptKind::EvidenceSubmitted, dispute_id, payload, |key| async move {
                let reply = self
                    .call_mutation(
                        "submit_evidence",
                        "submitDisputeEvidenceRequest",
                        payload.clone(),
                        &key,
                    )
                    .await?;
                let status = str_at(&reply, "/disputeStatus").unwrap_or_else(|| "Responded".into());
                Ok(self.runtime.receipt(
                    ReceiptKind::EvidenceSubmitted,
                    dispute_id,
                    key,
                    str_at(&reply, "/evidenceId"),
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
        let mut inner = json!({
            "disputeId": path_id(dispute_id)?,
            "outcome": response.outcome.as_str(),
        });
        if let Some(note) = &response.note {
            inner["note"] = json!(note);
        }
        if let Some(amount) = response.refund_amount {
            inner["refundAmount"] = json!(amount.to_string());
        }
        let payload = &inner;
        self.runtime
            .mutate(ReceiptKind::ResponsePushed, dispute_id, payload, |key| async move {
                let reply = self
                    .call_mutation(
                        "push_response",
                        "updateDisputeResponseRequest",
                        payload.clone(),
                        &key,
                    )
                    .await?;
                let status = str_at(&reply, "/disputeStatus").unwrap_or_else(|| "Responded".into());
                Ok(self
                    .runtime
                    .receipt(ReceiptKind::ResponsePushed, dispute_id, key, None, &status))
            })
            .await
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt> {
        let inner = json!({ "disputeId": path_id(dispute_id)? });
        let payload = &inner;
        self.runtime
            .mutate(ReceiptKind::DisputeAccepted, dispute_id, payload, |key| async move {
                let reply = self
                    .call_mutation("accept_dispute", "acceptDisputeRequest", payload.clone(), &key)
                    .await?;
                let status = str_at(&reply, "/disputeStatus").unwrap_or_else(|| "Accepted".into());
                Ok(self
                    .runtime
                    .receipt(ReceiptKind::DisputeAccepted, dispute_id, key, None, &status))
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
        let event = required_str(value, "/eventType")?;
        let webhook_id = required_str(value, "/notificationId")?;
        let timestamp =
            datetime_at(value, "/eventDate").unwrap_or_else(|| self.runtime.clock().now());
        let data = value.get("payload").cloned().unwrap_or(Value::Null);
        let dispute = if str_at(value, "/payload/entityName").as_deref() == Some("dispute") {
            let raw = raw_at(value, "/payload")?;
            Some(self.runtime.normalizer().normalize_raw(raw, dispute_fields)?)
        } else {
            None
        };
        Ok(WebhookEvent::new(
            PortalKind::AuthorizeNet,
            event,
            webhook_id,
            timestamp,
            data,
            verified.verification,
            dispute,
            verified.raw,
        ))
    }

    /// Deliveries are signed with the account signature key, so the
    /// subscription reports that key when one is configured.
    async fn register_webhook(&self, config: &WebhookConfig) -> PortalResult<WebhookSubscription> {
        let events: Vec<String> = if config.events.is_empty() {
            DEFAULT_WEBHOOK_EVENTS.iter().map(|e| e.to_string()).collect()
        } else {
            config.events.clone()
        };
        let key = self.webhooks.idempotency_key("webhook");
        let response = self
            .webhooks
            .send_mutation(
                "register_webhook",
                Method::POST,
                WEBHOOKS_PATH,
                Body::Json(json!({
                    "url": config.url,
                    "eventTypes": events,
                    "status": "active",
                })),
                &key,
            )
            .await?;
        let body = response.json()?;
        let id = required_str(&body, "/webhookId")?;
        let account_key = self
            .signature_key
            .as_ref()
            .map(|secret| secret.expose().to_string());
        Ok(self.webhooks.subscription(config, id, account_key))
    }

    /// Reachability only; a credential rejection still answers 200.
    async fn health_check(&self) -> HealthReport {
        health_via(&self.runtime, self.probe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_bom_parses() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(br#"{"messages":{"resultCode":"Ok","message":[]}}"#);
        assert!(parse_reply(&bytes).is_ok());
    }

    #[test]
    fn error_result_codes_are_classified() {
        let auth = br#"{"messages":{"resultCode":"Error","message":[{"code":"E00007","text":"User authentication failed due to invalid authentication values."}]}}"#;
        assert!(parse_reply(auth).unwrap_err().is_authentication());

        let other = br#"{"messages":{"resultCode":"Error","message":[{"code":"E00003","text":"invalid"}]}}"#;
        assert!(matches!(
            parse_reply(other),
            Err(PortalError::PermanentClient { status: 400, .. })
        ));
    }
}
