//! Content-addressed cache for collaborator replies.
//!
//! Entries are keyed on the hash of the full prompt and are append-only: a
//! key is written once and never mutated, so two runs sharing a cache can
//! only ever observe the same reply for the same prompt. Runs do not share
//! a cache unless one is explicitly attached to both clients.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Append-only prompt→reply cache.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<BTreeMap<String, String>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The content-addressed key for a prompt.
    pub fn key_for(prompt: &str) -> String {
        blake3::hash(prompt.as_bytes()).to_hex().to_string()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Insert a reply. The first write wins; later writes for the same key
    /// are ignored, which keeps entries immutable.
    pub fn insert(&self, key: String, reply: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(key).or_insert(reply);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
