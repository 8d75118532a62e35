use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of lifecycle states every portal status collapses into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    Pending,
    InReview,
    Submitted,
    Won,
    Lost,
    Expired,
    Resolved,
}

impl CanonicalStatus {
    pub const ALL: [CanonicalStatus; 7] = [
        CanonicalStatus::Pending,
        CanonicalStatus::InReview,
        CanonicalStatus::Submitted,
        CanonicalStatus::Won,
        CanonicalStatus::Lost,
        CanonicalStatus::Expired,
        CanonicalStatus::Resolved,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CanonicalStatus::Won
                | CanonicalStatus::Lost
                | CanonicalStatus::Expired
                | CanonicalStatus::Resolved
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "PENDING",
            CanonicalStatus::InReview => "IN_REVIEW",
            CanonicalStatus::Submitted => "SUBMITTED",
            CanonicalStatus::Won => "WON",
            CanonicalStatus::Lost => "LOST",
            CanonicalStatus::Expired => "EXPIRED",
            CanonicalStatus::Resolved => "RESOLVED",
        }
    }
}

impl Default for CanonicalStatus {
    fn default() -> Self {
        CanonicalStatus::Pending
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_exactly_four() {
        let terminal: Vec<_> = CanonicalStatus::ALL
            .iter()
            .filter(|status| status.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 4);
        assert!(!CanonicalStatus::Submitted.is_terminal());
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&CanonicalStatus::InReview).unwrap();
        assert_eq!(json, "\"IN_REVIEW\"");
    }
}
