use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCategory {
    Fraud,
    ConsumerDispute,
    ProcessingError,
    Authorization,
    Unknown,
}

impl ReasonCategory {
    pub fn label(self) -> &'static str {
        match self {
            ReasonCategory::Fraud => "Fraud",
            ReasonCategory::ConsumerDispute => "Consumer Dispute",
            ReasonCategory::ProcessingError => "Processing Error",
            ReasonCategory::Authorization => "Authorization",
            ReasonCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ReasonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a [`ReasonMapping`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// Exact hit in the portal's own table.
    Table,
    /// Exact hit in a card-network table.
    NetworkTable,
    /// Derived by a keyword or prefix rule.
    Heuristic,
    /// Nothing matched.
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonMapping {
    pub code: String,
    pub category: ReasonCategory,
    pub description: String,
    pub source: MappingSource,
}

impl ReasonMapping {
    pub fn unknown(code: &str) -> Self {
        Self {
            code: code.to_string(),
            category: ReasonCategory::Unknown,
            description: code.to_string(),
            source: MappingSource::Fallback,
        }
    }
}
