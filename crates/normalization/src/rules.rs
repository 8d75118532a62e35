use chargeguard_core_types::ReasonCategory;

use crate::network::NetworkFamily;

/// What a rule predicate gets to look at.
#[derive(Debug)]
pub struct RuleInput<'a> {
    /// Code as received, trimmed.
    pub code: &'a str,
    /// Lower-cased with `_` and `-` folded to spaces, for keyword search.
    pub text: String,
}

impl<'a> RuleInput<'a> {
    pub fn new(code: &'a str) -> Self {
        let code = code.trim();
        let text = code
            .chars()
            .map(|c| match c {
                '_' | '-' => ' ',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        Self { code, text }
    }

    fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.text.contains(needle))
    }
}

/// One step of the heuristic fallback. Rules are evaluated in order and the
/// first match wins.
#[derive(Clone, Copy, Debug)]
pub struct ReasonRule {
    pub name: &'static str,
    /// Network the pattern belongs to; `None` for keyword rules that apply to
    /// every portal.
    pub family: Option<NetworkFamily>,
    pub matches: fn(&RuleInput<'_>) -> bool,
    pub category: ReasonCategory,
}

impl ReasonRule {
    /// With a family hint only keyword rules and that family's patterns run.
    pub fn applies_to(&self, hint: Option<NetworkFamily>) -> bool {
        match (self.family, hint) {
            (None, _) | (_, None) => true,
            (Some(family), Some(hint)) => family == hint,
        }
    }
}

pub fn default_rules() -> Vec<ReasonRule> {
    vec![
        ReasonRule {
            name: "keyword_fraud",
            family: None,
            matches: |input| {
                input.contains_any(&[
                    "fraud",
                    "unauthorized",
                    "unauthorised",
                    "counterfeit",
                    "stolen",
                ])
            },
            category: ReasonCategory::Fraud,
        },
        ReasonRule {
            name: "keyword_authorization",
            family: None,
            matches: |input| input.contains_any(&["authorization", "authorisation", "declin"]),
            category: ReasonCategory::Authorization,
        },
        ReasonRule {
            name: "keyword_consumer",
            family: None,
            matches: |input| {
                input.contains_any(&[
                    "service",
                    "cancel",
                    "credit",
                    "not received",
                    "defective",
                    "not as described",
                    "subscription",
                ])
            },
            category: ReasonCategory::ConsumerDispute,
        },
        ReasonRule {
            name: "keyword_processing",
            family: None,
            matches: |input| {
                input.contains_any(&[
                    "duplicate",
                    "amount",
                    "processing",
                    "currency",
                    "late presentment",
                    "paid by other",
                ])
            },
            category: ReasonCategory::ProcessingError,
        },
        ReasonRule {
            name: "visa_10x",
            family: Some(NetworkFamily::Visa),
            matches: |input| visa_group(input.code) == Some(10),
            category: ReasonCategory::Fraud,
        },
        ReasonRule {
            name: "visa_11x",
            family: Some(NetworkFamily::Visa),
            matches: |input| visa_group(input.code) == Some(11),
            category: ReasonCategory::Authorization,
        },
        ReasonRule {
            name: "visa_12x",
            family: Some(NetworkFamily::Visa),
            matches: |input| visa_group(input.code) == Some(12),
            category: ReasonCategory::ProcessingError,
        },
        ReasonRule {
            name: "visa_13x",
            family: Some(NetworkFamily::Visa),
            matches: |input| visa_group(input.code) == Some(13),
            category: ReasonCategory::ConsumerDispute,
        },
        ReasonRule {
            name: "mastercard_48xx",
            family: Some(NetworkFamily::Mastercard),
            matches: |input| {
                input.code.len() == 4
                    && input.code.starts_with("48")
                    && input.code.bytes().all(|b| b.is_ascii_digit())
            },
            category: ReasonCategory::ConsumerDispute,
        },
        ReasonRule {
            name: "amex_fraud",
            family: Some(NetworkFamily::Amex),
            matches: |input| {
                letter_then_digits(input.code, "FR") || letter_then_digits(input.code, "F")
            },
            category: ReasonCategory::Fraud,
        },
        ReasonRule {
            name: "amex_consumer",
            family: Some(NetworkFamily::Amex),
            matches: |input| letter_then_digits(input.code, "C"),
            category: ReasonCategory::ConsumerDispute,
        },
        ReasonRule {
            name: "amex_processing",
            family: Some(NetworkFamily::Amex),
            matches: |input| letter_then_digits(input.code, "P"),
            category: ReasonCategory::ProcessingError,
        },
        ReasonRule {
            name: "amex_authorization",
            family: Some(NetworkFamily::Amex),
            matches: |input| letter_then_digits(input.code, "A"),
            category: ReasonCategory::Authorization,
        },
        ReasonRule {
            name: "discover_uaxx",
            family: Some(NetworkFamily::Discover),
            matches: |input| letter_then_digits(input.code, "UA"),
            category: ReasonCategory::Fraud,
        },
    ]
}

/// `10.4` → `Some(10)`; anything not shaped like a Visa code → `None`.
fn visa_group(code: &str) -> Option<u32> {
    let (group, rest) = code.split_once('.')?;
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !rest.split('.').all(digits) {
        return None;
    }
    if group.len() != 2 || !digits(group) {
        return None;
    }
    group.parse().ok()
}

/// `prefix` (case-insensitive) followed by one or more digits and nothing else.
fn letter_then_digits(code: &str, prefix: &str) -> bool {
    let Some(head) = code.get(..prefix.len()) else {
        return false;
    };
    let tail = &code[prefix.len()..];
    head.eq_ignore_ascii_case(prefix)
        && !tail.is_empty()
        && tail.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match(code: &str, hint: Option<NetworkFamily>) -> Option<&'static str> {
        let input = RuleInput::new(code);
        default_rules()
            .into_iter()
            .filter(|rule| rule.applies_to(hint))
            .find(|rule| (rule.matches)(&input))
            .map(|rule| rule.name)
    }

    #[test]
    fn keyword_rules_normalize_separators() {
        assert_eq!(first_match("product_not_received", None), Some("keyword_consumer"));
        assert_eq!(first_match("SUSPECTED-FRAUD", None), Some("keyword_fraud"));
        assert_eq!(first_match("card_declined", None), Some("keyword_authorization"));
    }

    #[test]
    fn visa_groups_are_recognized() {
        assert_eq!(visa_group("10.9"), Some(10));
        assert_eq!(visa_group("12.6.3"), Some(12));
        assert_eq!(visa_group("99.9"), Some(99));
        assert_eq!(visa_group("1.0"), None);
        assert_eq!(visa_group("10."), None);
        assert_eq!(first_match("13.99", None), Some("visa_13x"));
        assert_eq!(first_match("99.9", None), None);
    }

    #[test]
    fn family_hint_limits_pattern_rules() {
        assert_eq!(first_match("C99", Some(NetworkFamily::Amex)), Some("amex_consumer"));
        assert_eq!(first_match("C99", Some(NetworkFamily::Visa)), None);
        assert_eq!(first_match("4899", Some(NetworkFamily::Visa)), None);
        assert_eq!(first_match("4899", None), Some("mastercard_48xx"));
    }

    #[test]
    fn amex_fraud_prefers_fr_and_f_over_other_letters() {
        assert_eq!(first_match("FR9", Some(NetworkFamily::Amex)), Some("amex_fraud"));
        assert_eq!(first_match("F77", Some(NetworkFamily::Amex)), Some("amex_fraud"));
        assert_eq!(first_match("UA77", Some(NetworkFamily::Discover)), Some("discover_uaxx"));
    }
}
