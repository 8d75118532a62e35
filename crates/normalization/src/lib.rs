//! Maps portal-native statuses and reason codes onto the canonical model.
//!
//! Reason codes resolve through three layers: the portal's own table, the
//! card-network tables, then an ordered list of [`ReasonRule`]s. Anything
//! still unmatched becomes `UNKNOWN` with the raw code kept as description.

pub mod engine;
pub mod network;
pub mod rules;
pub mod tables;

pub use engine::NormalizationEngine;
pub use network::NetworkFamily;
pub use rules::{default_rules, ReasonRule, RuleInput};
pub use tables::{ReasonEntry, ReasonTable, StatusTable};
