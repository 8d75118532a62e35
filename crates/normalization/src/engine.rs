use chargeguard_core_types::{
    CanonicalDispute, CanonicalStatus, DisputeFields, MappingSource, PortalError, PortalKind,
    PortalResult, ReasonMapping,
};
use rust_decimal::Decimal;
use serde_json::value::RawValue;
use serde_json::Value;
use tracing::{debug, warn};

use crate::network::NetworkFamily;
use crate::rules::{default_rules, ReasonRule, RuleInput};
use crate::tables::{ReasonTable, StatusTable};

/// Translates one portal's vocabulary into the canonical model.
///
/// Immutable after construction and safe to share between concurrent calls.
#[derive(Clone, Debug)]
pub struct NormalizationEngine {
    portal: PortalKind,
    statuses: StatusTable,
    reasons: ReasonTable,
    rules: Vec<ReasonRule>,
}

impl NormalizationEngine {
    pub fn new(portal: PortalKind, statuses: StatusTable, reasons: ReasonTable) -> Self {
        Self {
            portal,
            statuses,
            reasons,
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<ReasonRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn portal(&self) -> PortalKind {
        self.portal
    }

    pub fn statuses(&self) -> &StatusTable {
        &self.statuses
    }

    /// Unknown statuses read as `PENDING`.
    pub fn normalize_status(&self, portal_status: &str) -> CanonicalStatus {
        match self.statuses.get(portal_status) {
            Some(status) => status,
            None => {
                warn!(
                    portal = %self.portal,
                    portal_status,
                    fallback = CanonicalStatus::Pending.as_str(),
                    "unmapped portal status"
                );
                CanonicalStatus::Pending
            }
        }
    }

    /// Portal table, then network tables, then the heuristic rules. Never
    /// fails; the last resort is `UNKNOWN` carrying the raw code.
    pub fn normalize_reason_code(&self, code: &str, family: Option<NetworkFamily>) -> ReasonMapping {
        let trimmed = code.trim();

        if let Some(entry) = self.reasons.get(trimmed) {
            return ReasonMapping {
                code: trimmed.to_string(),
                category: entry.category,
                description: entry.description.clone(),
                source: MappingSource::Table,
            };
        }

        let families: &[NetworkFamily] = match &family {
            Some(family) => std::slice::from_ref(family),
            None => &NetworkFamily::ALL,
        };
        for family in families {
            if let Some((category, description)) = family.lookup(trimmed) {
                return ReasonMapping {
                    code: trimmed.to_string(),
                    category,
                    description: description.to_string(),
                    source: MappingSource::NetworkTable,
                };
            }
        }

        let input = RuleInput::new(trimmed);
        if let Some(rule) = self
            .rules
            .iter()
            .filter(|rule| rule.applies_to(family))
            .find(|rule| (rule.matches)(&input))
        {
            warn!(
                portal = %self.portal,
                reason_code = trimmed,
                rule = rule.name,
                category = %rule.category,
                "reason code resolved by heuristic"
            );
            return ReasonMapping {
                code: trimmed.to_string(),
                category: rule.category,
                description: rule.category.label().to_string(),
                source: MappingSource::Heuristic,
            };
        }

        warn!(
            portal = %self.portal,
            reason_code = trimmed,
            "reason code unmapped; classified as unknown"
        );
        ReasonMapping::unknown(trimmed)
    }

    /// Builds a [`CanonicalDispute`] from a raw JSON payload. `raw_data` keeps
    /// the payload text exactly as given.
    pub fn normalize_dispute<F>(&self, raw: &str, extract: F) -> PortalResult<CanonicalDispute>
    where
        F: FnOnce(&Value) -> PortalResult<DisputeFields>,
    {
        let raw = RawValue::from_string(raw.to_owned())
            .map_err(|err| PortalError::malformed(format!("dispute payload: {err}")))?;
        self.normalize_raw(raw, extract)
    }

    /// Same as [`Self::normalize_dispute`] for a value already split out of a
    /// larger response, e.g. one element of a list page.
    pub fn normalize_raw<F>(&self, raw: Box<RawValue>, extract: F) -> PortalResult<CanonicalDispute>
    where
        F: FnOnce(&Value) -> PortalResult<DisputeFields>,
    {
        let value: Value = serde_json::from_str(raw.get())
            .map_err(|err| PortalError::malformed(format!("dispute payload: {err}")))?;
        let fields = extract(&value)?;
        self.assemble(fields, raw)
    }

    fn assemble(&self, fields: DisputeFields, raw: Box<RawValue>) -> PortalResult<CanonicalDispute> {
        let DisputeFields {
            dispute_id,
            case_number,
            amount,
            currency,
            card_last_four,
            card_brand,
            counterparty_name,
            reason_code,
            dispute_date,
            due_date,
            portal_status,
        } = fields;

        let dispute_id = dispute_id.trim().to_string();
        if dispute_id.is_empty() {
            return Err(PortalError::malformed("dispute id is empty"));
        }
        if amount < Decimal::ZERO {
            return Err(PortalError::malformed(format!(
                "dispute {dispute_id} has negative amount {amount}"
            )));
        }
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(PortalError::malformed(format!(
                "dispute {dispute_id} has invalid currency {currency:?}"
            )));
        }
        let dispute_date = dispute_date.ok_or_else(|| {
            PortalError::malformed(format!("dispute {dispute_id} has no dispute date"))
        })?;

        let family = card_brand.and_then(NetworkFamily::from_brand);
        let reason = self.normalize_reason_code(&reason_code, family);
        let status = self.normalize_status(&portal_status);
        debug!(
            portal = %self.portal,
            dispute_id = %dispute_id,
            status = status.as_str(),
            reason_category = %reason.category,
            "dispute normalized"
        );

        Ok(CanonicalDispute {
            dispute_id,
            case_number,
            amount,
            currency,
            card_last_four,
            card_brand,
            counterparty_name,
            reason_code: reason.code,
            reason_category: reason.category,
            reason_description: reason.description,
            dispute_date,
            due_date,
            status,
            portal_status,
            portal_type: self.portal,
            enrichment: None,
            raw_data: raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargeguard_core_types::{CardBrand, ReasonCategory};
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn engine() -> NormalizationEngine {
        NormalizationEngine::new(
            PortalKind::Stripe,
            StatusTable::new(&[
                ("won", CanonicalStatus::Won),
                ("lost", CanonicalStatus::Lost),
                ("under_review", CanonicalStatus::InReview),
            ]),
            ReasonTable::new(&[(
                "product_not_received",
                ReasonCategory::ConsumerDispute,
                "Product not received",
            )]),
        )
    }

    fn extract(value: &Value) -> PortalResult<DisputeFields> {
        Ok(DisputeFields {
            dispute_id: value["id"].as_str().unwrap_or_default().to_string(),
            amount: Decimal::from_str(value["amount"].as_str().unwrap_or("0")).unwrap(),
            currency: value["currency"].as_str().unwrap_or_default().to_string(),
            reason_code: value["reason"].as_str().unwrap_or_default().to_string(),
            portal_status: value["status"].as_str().unwrap_or_default().to_string(),
            card_brand: value["brand"].as_str().map(CardBrand::from_portal),
            dispute_date: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            ..DisputeFields::default()
        })
    }

    #[test]
    fn status_matching_is_case_insensitive_with_pending_default() {
        let engine = engine();
        assert_eq!(engine.normalize_status("WON"), CanonicalStatus::Won);
        assert_eq!(engine.normalize_status("Won"), CanonicalStatus::Won);
        assert_eq!(engine.normalize_status("charge_refunded"), CanonicalStatus::Pending);
    }

    #[test]
    fn visa_table_resolves_card_absent_fraud() {
        let mapping = engine().normalize_reason_code("10.4", Some(NetworkFamily::Visa));
        assert_eq!(mapping.category, ReasonCategory::Fraud);
        assert_eq!(mapping.description, "Other Fraud - Card-Absent Environment");
        assert_eq!(mapping.source, MappingSource::NetworkTable);
    }

    #[test]
    fn unknown_code_preserves_raw_value() {
        let mapping = engine().normalize_reason_code("99.9", None);
        assert_eq!(mapping.category, ReasonCategory::Unknown);
        assert_eq!(mapping.description, "99.9");
        assert_eq!(mapping.source, MappingSource::Fallback);
    }

    #[test]
    fn keyword_heuristic_catches_fraud_wording() {
        let mapping = engine().normalize_reason_code("XX_FRAUD_MULTIPLE", None);
        assert_eq!(mapping.category, ReasonCategory::Fraud);
        assert_eq!(mapping.source, MappingSource::Heuristic);
    }

    #[test]
    fn portal_table_wins_over_heuristics() {
        let mapping = engine().normalize_reason_code("product_not_received", None);
        assert_eq!(mapping.source, MappingSource::Table);
        assert_eq!(mapping.description, "Product not received");
    }

    #[test]
    fn family_hint_excludes_other_network_tables() {
        let mapping = engine().normalize_reason_code("4837", Some(NetworkFamily::Visa));
        assert_eq!(mapping.category, ReasonCategory::Unknown);
        let mapping = engine().normalize_reason_code("4837", None);
        assert_eq!(mapping.category, ReasonCategory::Fraud);
    }

    #[test]
    fn raw_data_is_byte_identical() {
        let raw = "{ \"id\":\"dp_1\",  \"amount\":\"12.50\",\"currency\":\"usd\",\n \"reason\":\"10.4\",\"status\":\"LOST\",\"brand\":\"visa\" }";
        let dispute = engine().normalize_dispute(raw, extract).unwrap();
        assert_eq!(dispute.raw_json(), raw);
        assert_eq!(dispute.currency, "USD");
        assert_eq!(dispute.status, CanonicalStatus::Lost);
        assert_eq!(dispute.reason_category, ReasonCategory::Fraud);
        assert_eq!(dispute.portal_status, "LOST");
    }

    #[test]
    fn invalid_records_are_rejected_not_partially_built() {
        let engine = engine();
        let cases = [
            r#"{"id":"","amount":"1","currency":"USD"}"#,
            r#"{"id":"dp_2","amount":"-1","currency":"USD"}"#,
            r#"{"id":"dp_3","amount":"1","currency":"DOLLARS"}"#,
            r#"not json"#,
        ];
        for raw in cases {
            let err = engine.normalize_dispute(raw, extract).unwrap_err();
            assert!(matches!(err, PortalError::MalformedPayload(_)), "{raw}: {err:?}");
        }
    }
}
