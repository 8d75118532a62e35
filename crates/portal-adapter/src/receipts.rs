use std::time::{Duration, Instant};

use chargeguard_core_types::{ActionReceipt, ReceiptKind};
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Short-lived memory of completed mutations.
///
/// A caller that repeats an identical mutation (same kind, dispute and
/// payload) inside the TTL gets the recorded receipt back instead of a second
/// portal call. Different payloads for the same dispute are never collapsed.
/// Expired entries are swept on every insert and the map is capped.
pub struct ReceiptCache {
    ttl: Duration,
    capacity: usize,
    entries: DashMap<String, Entry>,
}

pub const DEFAULT_CAPACITY: usize = 10_000;

impl Default for ReceiptCache {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[derive(Clone)]
struct Entry {
    expires_at: Instant,
    receipt: ActionReceipt,
}

impl ReceiptCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            capacity: DEFAULT_CAPACITY,
            entries: DashMap::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn fingerprint(kind: ReceiptKind, dispute_id: &str, payload: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key_prefix(kind).as_bytes());
        hasher.update([0]);
        hasher.update(dispute_id.as_bytes());
        hasher.update([0]);
        hasher.update(payload.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<ActionReceipt> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(fingerprint)
            .map(|entry| (entry.expires_at > now, entry.receipt.clone()));
        match hit {
            Some((true, receipt)) => Some(receipt),
            Some((false, _)) => {
                self.entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, fingerprint: String, receipt: &ActionReceipt) {
        if self.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        while self.entries.len() >= self.capacity && !self.entries.contains_key(&fingerprint) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
        let entry = Entry {
            expires_at: now + self.ttl,
            receipt: receipt.clone(),
        };
        self.entries.insert(fingerprint, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Idempotency-key prefix for each kind of mutation.
pub fn key_prefix(kind: ReceiptKind) -> &'static str {
    match kind {
        ReceiptKind::EvidenceSubmitted => "evidence",
        ReceiptKind::ResponsePushed => "response",
        ReceiptKind::DisputeAccepted => "accept",
    }
}
