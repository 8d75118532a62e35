use chargeguard_core_types::PortalKind;
use chrono::Utc;
use uuid::Uuid;

/// Mints `prefix_portal_timestamp_random` keys for mutating calls.
///
/// A key is generated once per logical operation and reused for every retry
/// of that operation so the portal can deduplicate the side effect.
#[derive(Clone, Debug)]
pub struct IdempotencyKeyGenerator {
    portal: PortalKind,
}

impl IdempotencyKeyGenerator {
    pub fn new(portal: PortalKind) -> Self {
        Self { portal }
    }

    pub fn generate(&self, prefix: &str) -> String {
        let prefix = sanitize(prefix);
        let timestamp = Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple();
        format!("{prefix}_{}_{timestamp}_{random}", self.portal.as_str())
    }
}

fn sanitize(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "op".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ten_thousand_keys_are_distinct() {
        let generator = IdempotencyKeyGenerator::new(PortalKind::Stripe);
        let keys: HashSet<String> = (0..10_000).map(|_| generator.generate("evidence")).collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn key_has_four_segments() {
        let generator = IdempotencyKeyGenerator::new(PortalKind::Paypal);
        let key = generator.generate("accept");
        let parts: Vec<&str> = key.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "accept");
        assert_eq!(parts[1], "paypal");
        assert!(parts[2].parse::<i64>().is_ok());
        assert_eq!(parts[3].len(), 32);
    }

    #[test]
    fn underscores_in_prefix_do_not_break_format() {
        let generator = IdempotencyKeyGenerator::new(PortalKind::Stripe);
        let key = generator.generate("push_response");
        assert!(key.starts_with("pushresponse_stripe_"));
    }
}
