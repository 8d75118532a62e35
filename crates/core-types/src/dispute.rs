use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::portal::PortalKind;
use crate::reason::ReasonCategory;
use crate::status::CanonicalStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Other,
}

impl CardBrand {
    /// Lenient parse of the brand spellings portals use.
    pub fn from_portal(value: &str) -> CardBrand {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "visa" => CardBrand::Visa,
            "mastercard" | "mc" | "master" => CardBrand::Mastercard,
            "amex" | "americanexpress" => CardBrand::Amex,
            "discover" | "discovercard" => CardBrand::Discover,
            _ => CardBrand::Other,
        }
    }
}

/// Portal-neutral dispute record. Built only by the normalization engine so
/// that status and reason fields are always populated from the closed enums.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDispute {
    pub dispute_id: String,
    pub case_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub card_last_four: Option<String>,
    pub card_brand: Option<CardBrand>,
    pub counterparty_name: Option<String>,
    pub reason_code: String,
    pub reason_category: ReasonCategory,
    pub reason_description: String,
    pub dispute_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: CanonicalStatus,
    pub portal_status: String,
    pub portal_type: PortalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Value>,
    pub raw_data: Box<RawValue>,
}

impl CanonicalDispute {
    pub fn raw_json(&self) -> &str {
        self.raw_data.get()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Fields a portal mapper extracts before normalization assigns status and
/// reason classification.
#[derive(Clone, Debug, Default)]
pub struct DisputeFields {
    pub dispute_id: String,
    pub case_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub card_last_four: Option<String>,
    pub card_brand: Option<CardBrand>,
    pub counterparty_name: Option<String>,
    pub reason_code: String,
    pub dispute_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub portal_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_parsing_tolerates_spelling() {
        assert_eq!(CardBrand::from_portal("American Express"), CardBrand::Amex);
        assert_eq!(CardBrand::from_portal("MASTERCARD"), CardBrand::Mastercard);
        assert_eq!(CardBrand::from_portal("unionpay"), CardBrand::Other);
    }
}
