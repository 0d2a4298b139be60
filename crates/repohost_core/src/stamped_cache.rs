//! Concurrent cache whose entries are valid only for an exact stamp.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// One cached value and the stamp it was computed for.
#[derive(Debug, Clone)]
struct CachedEntry<T, S> {
    stamp: S,
    value: T,
}

/// Maps a key to a value plus the logical version stamp it was computed at.
///
/// Validity is exact equality of stamps, never ordering: a value computed for
/// a *newer* stamp is just as stale as one computed for an older one.
/// Readers always receive clones.
#[derive(Debug)]
pub struct TimestampedCache<T, S = DateTime<Utc>> {
    entries: DashMap<String, CachedEntry<T, S>>,
}

impl<T: Clone, S: Clone + PartialEq> TimestampedCache<T, S> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// True if `key` holds a value computed for exactly `stamp`.
    pub fn has_current(&self, key: &str, stamp: &S) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.stamp == *stamp)
            .unwrap_or(false)
    }

    /// Returns the value for `key` if it was computed for exactly `stamp`.
    pub fn get_current(&self, key: &str, stamp: &S) -> Option<T> {
        self.entries
            .get(key)
            .filter(|entry| entry.stamp == *stamp)
            .map(|entry| entry.value.clone())
    }

    /// Returns the cached value regardless of its stamp.
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Returns the stamp the cached value was computed for.
    pub fn stamp(&self, key: &str) -> Option<S> {
        self.entries.get(key).map(|entry| entry.stamp.clone())
    }

    /// Creates or updates the entry in place.
    pub fn update(&self, key: &str, stamp: S, value: T) {
        self.entries
            .entry(key.to_string())
            .and_modify(|entry| {
                entry.stamp = stamp.clone();
                entry.value = value.clone();
            })
            .or_insert_with(|| CachedEntry {
                stamp: stamp.clone(),
                value: value.clone(),
            });
    }

    /// Removes the entry, returning its value.
    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone, S: Clone + PartialEq> Default for TimestampedCache<T, S> {
    fn default() -> Self {
        Self::new()
    }
}
