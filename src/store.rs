//! Key store: the sole owner of tracking records.
//!
//! Backed by a sharded `DashMap`, so callers for different keys only contend
//! when their keys land on the same shard, while all access to one key goes
//! through that key's shard lock.

use crate::rate_limit::{RateKey, TrackingRecord};
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct KeyStore {
    records: DashMap<String, TrackingRecord>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Run `f` against the record for `key`, creating it on a miss.
    ///
    /// The shard lock is held for the whole call, so everything `f` does is
    /// one atomic unit with respect to other accesses to the same key.
    pub fn update<R>(
        &self,
        key: &RateKey,
        route: &str,
        window: Duration,
        now: Instant,
        f: impl FnOnce(&mut TrackingRecord) -> R,
    ) -> R {
        // hot path: the key is already tracked, no owned key needed
        if let Some(mut entry) = self.records.get_mut(key.as_str()) {
            return f(entry.value_mut());
        }
        let mut entry = self
            .records
            .entry(key.as_str().to_string())
            .or_insert_with(|| TrackingRecord::new(route, window, now));
        f(entry.value_mut())
    }

    /// Like [`KeyStore::update`] but never creates a record.
    pub fn update_existing<R>(
        &self,
        key: &RateKey,
        f: impl FnOnce(&mut TrackingRecord) -> R,
    ) -> Option<R> {
        self.update_raw(key.as_str(), f)
    }

    pub fn get(&self, key: &RateKey) -> Option<TrackingRecord> {
        self.records.get(key.as_str()).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, key: &RateKey) -> bool {
        self.records.remove(key.as_str()).is_some()
    }

    // Remove `key` only if `predicate` still holds under the shard lock
    pub(crate) fn remove_if(
        &self,
        key: &str,
        predicate: impl FnOnce(&TrackingRecord) -> bool,
    ) -> bool {
        self.records
            .remove_if(key, |_, record| predicate(record))
            .is_some()
    }

    pub(crate) fn update_raw<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut TrackingRecord) -> R,
    ) -> Option<R> {
        self.records.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    // Visits every record. Shards are read-locked one at a time, so this
    // sees an eventually consistent view under concurrent mutation.
    pub fn for_each(&self, mut f: impl FnMut(&str, &TrackingRecord)) {
        for entry in self.records.iter() {
            f(entry.key(), entry.value());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
