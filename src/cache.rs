//! Fallback cache of successful GET responses.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::time::Instant;

use crate::Fingerprint;

#[derive(Clone, Debug)]
struct CacheEntry {
    payload: JsonValue,
    stored_at: Instant,
    max_age: Duration,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.max_age
    }
}

/// At most one entry per fingerprint. Expired entries are purged when they
/// are looked up; nothing sweeps the map in the background.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: Fingerprint, payload: JsonValue, max_age: Duration) {
        let entry = CacheEntry {
            payload,
            stored_at: Instant::now(),
            max_age,
        };
        self.entries.lock().insert(key, entry);
    }

    /// Returns the payload if the entry is still valid, dropping it otherwise.
    pub fn get(&self, key: &Fingerprint) -> Option<JsonValue> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_valid(Instant::now()) {
            return Some(entry.payload.clone());
        }
        entries.remove(key);
        None
    }

    pub fn remove(&self, key: &Fingerprint) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
