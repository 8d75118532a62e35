//! JSON-pointer helpers shared by the portal field mappers.

use std::str::FromStr;

use chargeguard_core_types::{CardBrand, PortalError, PortalResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::value::RawValue;
use serde_json::Value;

/// Currencies without a minor unit.
const ZERO_DECIMAL_CURRENCIES: [&str; 16] = [
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// String at `pointer`; numbers are rendered as text.
pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn required_str(value: &Value, pointer: &str) -> PortalResult<String> {
    str_at(value, pointer).ok_or_else(|| PortalError::malformed(format!("missing field {pointer}")))
}

/// Decimal amount given either as a JSON number or a string.
pub fn decimal_at(value: &Value, pointer: &str) -> PortalResult<Decimal> {
    let text = required_str(value, pointer)?;
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| PortalError::malformed(format!("field {pointer} is not a decimal: {text}")))
}

/// Integer amount in minor units (cents) scaled by the currency exponent.
pub fn minor_units_at(value: &Value, pointer: &str, currency: &str) -> PortalResult<Decimal> {
    let minor = value
        .pointer(pointer)
        .and_then(Value::as_i64)
        .ok_or_else(|| PortalError::malformed(format!("field {pointer} is not an integer amount")))?;
    let scale = if ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_uppercase().as_str()) {
        0
    } else {
        2
    };
    Ok(Decimal::new(minor, scale))
}

/// RFC 3339 timestamp or bare `YYYY-MM-DD` date (read as midnight UTC).
pub fn datetime_at(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    let text = str_at(value, pointer)?;
    parse_datetime(&text)
}

pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Unix seconds.
pub fn unix_at(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    let seconds = value.pointer(pointer)?.as_i64()?;
    Utc.timestamp_opt(seconds, 0).single()
}

pub fn brand_at(value: &Value, pointer: &str) -> Option<CardBrand> {
    str_at(value, pointer).map(|brand| CardBrand::from_portal(&brand))
}

/// Last four digits of a possibly masked card number such as `XXXX1111`.
pub fn last_four(text: &str) -> Option<String> {
    let digits: Vec<char> = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return None;
    }
    Some(digits[digits.len() - 4..].iter().collect())
}

/// Re-serializes a sub-object so it can be normalized on its own.
pub fn raw_at(value: &Value, pointer: &str) -> PortalResult<Box<RawValue>> {
    let object = value
        .pointer(pointer)
        .filter(|v| v.is_object())
        .ok_or_else(|| PortalError::malformed(format!("missing object {pointer}")))?;
    Ok(serde_json::value::to_raw_value(object)?)
}
