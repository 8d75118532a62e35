use std::collections::HashMap;

use chargeguard_core_types::{CanonicalStatus, ReasonCategory};

/// Portal status vocabulary. Keys are matched case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct StatusTable {
    index: HashMap<String, CanonicalStatus>,
    order: Vec<(String, CanonicalStatus)>,
}

impl StatusTable {
    pub fn new(entries: &[(&str, CanonicalStatus)]) -> Self {
        let mut table = Self::default();
        for (portal, canonical) in entries {
            table.insert(portal, *canonical);
        }
        table
    }

    pub fn insert(&mut self, portal_status: &str, canonical: CanonicalStatus) {
        let key = portal_status.trim().to_ascii_lowercase();
        if self.index.insert(key, canonical).is_none() {
            self.order.push((portal_status.to_string(), canonical));
        }
    }

    pub fn get(&self, portal_status: &str) -> Option<CanonicalStatus> {
        self.index
            .get(&portal_status.trim().to_ascii_lowercase())
            .copied()
    }

    /// First portal spelling registered for `canonical`, for outbound filters.
    pub fn portal_status_for(&self, canonical: CanonicalStatus) -> Option<&str> {
        self.order
            .iter()
            .find(|(_, status)| *status == canonical)
            .map(|(portal, _)| portal.as_str())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ReasonEntry {
    pub category: ReasonCategory,
    pub description: String,
}

/// Portal-specific reason codes. Lookup is exact after trimming, then
/// case-insensitive.
#[derive(Clone, Debug, Default)]
pub struct ReasonTable {
    entries: HashMap<String, ReasonEntry>,
}

impl ReasonTable {
    pub fn new(entries: &[(&str, ReasonCategory, &str)]) -> Self {
        let entries = entries
            .iter()
            .map(|(code, category, description)| {
                (
                    code.to_string(),
                    ReasonEntry {
                        category: *category,
                        description: description.to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, code: &str) -> Option<&ReasonEntry> {
        let code = code.trim();
        self.entries.get(code).or_else(|| {
            self.entries
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(code))
                .map(|(_, entry)| entry)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
