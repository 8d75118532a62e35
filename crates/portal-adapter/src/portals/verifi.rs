use std::sync::Arc;

use async_trait::async_trait;
use chargeguard_core_types::{
    ActionReceipt, AuthStatus, CanonicalDispute, DisputeFields, DisputeFilter, DisputePage,
    EvidencePackage, HealthReport, PortalKind, PortalResult, ReceiptKind, ResponseData,
    StatusSnapshot, WebhookConfig, WebhookEvent, WebhookSubscription,
};
use http::{HeaderMap, Method};
use normalization::{NormalizationEngine, ReasonTable, StatusTable};
use portal_auth::{OAuth2ClientCredentials, OAuth2Credential, TokenRequestAuth};
use portal_net::Body;
use serde_json::{json, Value};
use tracing::{debug, warn};
use webhook_verifier::{HmacAlgorithm, SignatureScheme, WebhookVerifier};

use crate::adapter::{PortalAdapter, WebhookBody};
use crate::config::{resolve_base_url, VerifiSettings};
use crate::extract::{brand_at, datetime_at, decimal_at, last_four, raw_at, required_str, str_at};
use crate::portals::{array_at, health_via, into_page, normalize_item, path_id, snapshot};
use crate::runtime::{generate_signing_secret, join_url, AdapterContext, PortalRuntime};

const ALERTS_PATH: &str = "/v1/alerts";

pub fn normalizer() -> NormalizationEngine {
    use chargeguard_core_types::CanonicalStatus::*;
    use chargeguard_core_types::ReasonCategory::*;
    NormalizationEngine::new(
        PortalKind::Verifi,
        StatusTable::new(&[
            ("NEW", Pending),
            ("PENDING", Pending),
            ("ACKNOWLEDGED", InReview),
            ("IN_PROGRESS", InReview),
            ("RESPONDED", Submitted),
            ("REFUNDED", Resolved),
            ("RESOLVED", Resolved),
            ("CLOSED", Resolved),
            ("DECLINED", Lost),
            ("EXPIRED", Expired),
        ]),
        ReasonTable::new(&[
            ("CONFIRMED_FRAUD", Fraud, "Issuer-confirmed fraud"),
            ("CUSTOMER_DISPUTE", ConsumerDispute, "Cardholder dispute"),
        ]),
    )
}

fn dispute_fields(value: &Value) -> PortalResult<DisputeFields> {
    Ok(DisputeFields {
        dispute_id: required_str(value, "/alertId")?,
        case_number: str_at(value, "/caseNumber"),
        amount: decimal_at(value, "/amount")?,
        currency: required_str(value, "/currency")?,
        card_last_four: str_at(value, "/cardNumber").and_then(|number| last_four(&number)),
        card_brand: brand_at(value, "/cardBrand"),
        counterparty_name: str_at(value, "/merchantDescriptor"),
        reason_code: required_str(value, "/reasonCode")?,
        dispute_date: datetime_at(value, "/alertDate"),
        due_date: datetime_at(value, "/responseDueDate"),
        portal_status: required_str(value, "/status")?,
    })
}

/// Verifi prevention alerts: pre-chargeback notices the merchant can refund
/// or contest before they become disputes.
pub struct VerifiAdapter {
    runtime: PortalRuntime,
    risk_scoring: bool,
}

impl VerifiAdapter {
    pub fn new(settings: &VerifiSettings, context: &AdapterContext) -> PortalResult<Self> {
        let base_url = resolve_base_url(PortalKind::Verifi, settings.base_url.as_deref())?;
        let credential = OAuth2Credential {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            token_url: join_url(&base_url, "/oauth2/token")?,
            scope: Some("alerts".to_string()),
            token_auth: TokenRequestAuth::NonceDigest,
        };
        let auth = OAuth2ClientCredentials::new(
            credential,
            context.transport.clone(),
            context.clock.clone(),
        )?
        .with_timeout(context.timeout);
        let verifier = WebhookVerifier::new(
            SignatureScheme::raw_hex("x-verifi-signature", HmacAlgorithm::Sha256),
            settings.webhook_secret.clone(),
            context.clock.clone(),
        );
        let runtime = PortalRuntime::new(context, base_url, Arc::new(auth), normalizer())
            .with_verifier(verifier)
            .with_default_header("x-merchant-id", &settings.merchant_id)?;
        Ok(Self {
            runtime,
            risk_scoring: settings.risk_scoring,
        })
    }

    /// Attaches the alert's risk score when the lookup succeeds. Any failure
    /// is logged and the dispute is returned as it was.
    async fn enrich(&self, mut dispute: CanonicalDispute) -> CanonicalDispute {
        if !self.risk_scoring {
            return dispute;
        }
        let path = match path_id(&dispute.dispute_id) {
            Ok(id) => format!("{ALERTS_PATH}/{id}/risk-score"),
            Err(err) => {
                warn!(portal = "verifi", error = %err, "risk score lookup skipped");
                return dispute;
            }
        };
        let lookup = match self.runtime.get("risk_score", &path, &[]).await {
            Ok(response) => response.json(),
            Err(err) => Err(err),
        };
        match lookup {
            Ok(score) if !score.is_null() => {
                debug!(portal = "verifi", dispute_id = %dispute.dispute_id, "risk score attached");
                dispute.enrichment = Some(json!({ "riskScore": score }));
            }
            Ok(_) => {}
            Err(err) => warn!(
                portal = "verifi",
                dispute_id = %dispute.dispute_id,
                error = %err,
                "risk score enrichment failed"
            ),
        }
        dispute
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
        let path = format!("{ALERTS_PATH}/{}/{action}", path_id(dispute_id)?);
        let payload = &body;
        self.runtime
            .mutate(kind, dispute_id, payload, |key| async move {
                let response = self
                    .runtime
                    .send_mutation(operation, Method::POST, &path, Body::Json(payload.clone()), &key)
                    .await?;
                let reply = response.json()?;
                let status = str_at(&reply, "/status").unwrap_or_else(|| settled_status.to_string());
                let reference = str_at(&reply, "/responseId").or_else(|| str_at(&reply, "/id"));
                Ok(self.runtime.receipt(kind, dispute_id, key, reference, &status))
            })
            .await
    }
}

#[async_trait]
impl PortalAdapter for VerifiAdapter {
    fn portal(&self) -> PortalKind {
        PortalKind::Verifi
    }

    async fn authenticate(&self) -> PortalResult<AuthStatus> {
        let mut probe = self.runtime.request(Method::GET, ALERTS_PATH)?;
        probe.url.query_pairs_mut().append_pair("limit", "1");
        self.runtime.probe_auth(probe).await
    }

    async fn receive_dispute(&self, raw: &str) -> PortalResult<CanonicalDispute> {
        let dispute = self.runtime.normalizer().normalize_dispute(raw, dispute_fields)?;
        Ok(self.enrich(dispute).await)
    }

    async fn get_dispute_status(&self, dispute_id: &str) -> PortalResult<StatusSnapshot> {
        let path = format!("{ALERTS_PATH}/{}", path_id(dispute_id)?);
        let response = self.runtime.get("get_dispute_status", &path, &[]).await?;
        let dispute = self
            .runtime
            .normalizer()
            .normalize_dispute(&response.text(), dispute_fields)?;
        Ok(snapshot(dispute))
    }

    async fn list_disputes(&self, filter: &DisputeFilter) -> PortalResult<DisputePage> {
        let mut query = vec![
            ("page", filter.effective_page().to_string()),
            ("limit", filter.effective_limit().to_string()),
        ];
        if let Some(since) = filter.since {
            query.push(("since", since.to_rfc3339()));
        }
        if let Some(status) = filter
            .status
            .and_then(|status| self.runtime.normalizer().statuses().portal_status_for(status))
        {
            query.push(("status", status.to_string()));
        }
        let response = self.runtime.get("list_disputes", ALERTS_PATH, &query).await?;
        let body = response.json()?;

        let items = array_at(&body, "/alerts")?;
        let mut disputes = Vec::with_capacity(items.len());
        for item in items {
            disputes.push(normalize_item(self.runtime.normalizer(), item, dispute_fields)?);
        }
        let has_more = body
            .pointer("/pagination/hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(into_page(filter, disputes, has_more, None))
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
            "evidence",
            serde_json::to_value(evidence)?,
            "RESPONDED",
        )
        .await
    }

    async fn push_response(
        &self,
        dispute_id: &str,
        response: &ResponseData,
    ) -> PortalResult<ActionReceipt> {
        let body = json!({
            "outcome": response.outcome.as_str(),
            "note": response.note,
            "refundAmount": response.refund_amount.map(|amount| amount.to_string()),
            "fields": response.fields,
        });
        self.post_action(
            ReceiptKind::ResponsePushed,
            "push_response",
            dispute_id,
            "response",
            body,
            "RESPONDED",
        )
        .await
    }

    async fn accept_dispute(&self, dispute_id: &str) -> PortalResult<ActionReceipt> {
        self.post_action(
            ReceiptKind::DisputeAccepted,
            "accept_dispute",
            dispute_id,
            "accept",
            json!({}),
            "REFUNDED",
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
        let event = required_str(value, "/eventType")?;
        let webhook_id = required_str(value, "/eventId")?;
        let timestamp =
            datetime_at(value, "/timestamp").unwrap_or_else(|| self.runtime.clock().now());
        let data = value.get("alert").cloned().unwrap_or(Value::Null);
        let dispute = if data.is_object() {
            let raw = raw_at(value, "/alert")?;
            Some(self.runtime.normalizer().normalize_raw(raw, dispute_fields)?)
        } else {
            None
        };
        Ok(WebhookEvent::new(
            PortalKind::Verifi,
            event,
            webhook_id,
            timestamp,
            data,
            verified.verification,
            dispute,
            verified.raw,
        ))
    }

    /// The signing secret is minted here and handed to Verifi.
    async fn register_webhook(&self, config: &WebhookConfig) -> PortalResult<WebhookSubscription> {
        let secret = generate_signing_secret();
        let body = json!({
            "url": config.url,
            "events": config.events,
            "description": config.description,
            "signingSecret": secret.expose(),
        });
        let key = self.runtime.idempotency_key("webhook");
        let response = self
            .runtime
            .send_mutation("register_webhook", Method::POST, "/v1/webhooks", Body::Json(body), &key)
            .await?;
        let reply = response.json()?;
        let id = required_str(&reply, "/id")?;
        Ok(self
            .runtime
            .subscription(config, id, Some(secret.expose().to_string())))
    }

    async fn health_check(&self) -> HealthReport {
        let probe = self.runtime.request(Method::GET, ALERTS_PATH).map(|mut probe| {
            probe.url.query_pairs_mut().append_pair("limit", "1");
            probe
        });
        health_via(&self.runtime, probe).await
    }
}
