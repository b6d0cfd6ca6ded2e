//! Key/value store where every entry carries its own absolute expiry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
  value: V,
  expires_at: DateTime<Utc>,
}

/// In-memory TTL cache.
///
/// An entry is visible while `now <= expires_at`. Reads past expiry evict the
/// entry and behave as a miss, so [`TtlCache::cleanup`] is only needed to
/// reclaim memory for keys that are never read again. There is no size bound.
///
/// Not synchronized: owners that share it across tasks wrap it in a mutex.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
  entries: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V: Clone> TtlCache<V> {
  pub fn new() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }

  /// Get a live entry, evicting it if it has expired.
  pub fn get(&mut self, key: &str) -> Option<V> {
    self.get_at(key, Utc::now())
  }

  pub fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<V> {
    let expired = match self.entries.get(key) {
      None => return None,
      Some(entry) => now > entry.expires_at,
    };

    if expired {
      self.entries.remove(key);
      return None;
    }

    self.entries.get(key).map(|entry| entry.value.clone())
  }

  /// Store `value` under `key`, replacing any previous entry.
  pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
    self.set_at(key, value, ttl, Utc::now());
  }

  pub fn set_at(&mut self, key: impl Into<String>, value: V, ttl: Duration, now: DateTime<Utc>) {
    self.entries.insert(
      key.into(),
      CacheEntry {
        value,
        expires_at: now + ttl,
      },
    );
  }

  /// Drop every expired entry. Returns how many were evicted.
  pub fn cleanup(&mut self) -> usize {
    self.cleanup_at(Utc::now())
  }

  pub fn cleanup_at(&mut self, now: DateTime<Utc>) -> usize {
    let before = self.entries.len();
    self.entries.retain(|_, entry| now <= entry.expires_at);
    before - self.entries.len()
  }

  /// Number of stored entries, expired ones included until evicted.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
