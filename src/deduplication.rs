//! Service for suppressing repeat notifications inside a time window.

use std::sync::Mutex;

use chrono::Utc;
use lru::LruCache;

/// A time-windowed duplicate filter keyed by opaque strings.
///
/// The cache remembers when each key was last allowed through. A key seen
/// again strictly less than `window_ms` later is a duplicate; a key seen at
/// exactly the window boundary or later is allowed and its timestamp is
/// refreshed. The check and the record are a single operation under one
/// lock, so two racing callers can never both be told "not a duplicate".
pub struct DedupeCache {
    window_ms: u64,
    max_entries: usize,
    entries: Mutex<LruCache<String, u64>>,
}

impl DedupeCache {
    /// Creates a new `DedupeCache`.
    ///
    /// # Arguments
    /// * `window_ms` - Suppression window in milliseconds.
    /// * `max_entries` - Hard cap on tracked keys.
    pub fn new(window_ms: u64, max_entries: usize) -> Self {
        Self {
            window_ms,
            max_entries,
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Checks `key` against the wall clock. See [`DedupeCache::should_drop_at`].
    pub fn should_drop(&self, key: &str) -> bool {
        self.should_drop_at(key, Utc::now().timestamp_millis() as u64)
    }

    /// Returns `true` when `key` was last recorded less than one window
    /// before `now_ms`. Otherwise records `key` at `now_ms`, marks it
    /// most-recently-used, and returns `false`.
    pub fn should_drop_at(&self, key: &str, now_ms: u64) -> bool {
        let mut entries = self.entries.lock().unwrap();

        if let Some(&last_seen) = entries.peek(key) {
            if now_ms.saturating_sub(last_seen) < self.window_ms {
                return true;
            }
        }

        entries.put(key.to_string(), now_ms);

        if entries.len() > self.max_entries {
            // Age out everything already past the window before evicting
            // entries that are still live.
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, &seen)| now_ms.saturating_sub(seen) >= self.window_ms)
                .map(|(key, _)| key.clone())
                .collect();
            for stale in &expired {
                entries.pop(stale);
            }
            while entries.len() > self.max_entries {
                entries.pop_lru();
            }
        }

        metrics::gauge!("dedupe_cache_entries").set(entries.len() as f64);

        false
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
