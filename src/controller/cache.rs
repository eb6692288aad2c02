//! # Dedup Cache
//!
//! Remembers recently handled work so noisy re-deliveries of the same pod
//! skip store round-trips. Entries expire lazily on lookup, and inserts sweep
//! out expired entries at most once per TTL. A zero TTL disables the cache
//! entirely.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ExpiringCache<K> {
    ttl: Duration,
    entries: Mutex<Entries<K>>,
}

#[derive(Debug)]
struct Entries<K> {
    recorded: HashMap<K, Instant>,
    last_sweep: Instant,
}

impl<K: Eq + Hash> ExpiringCache<K> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(Entries {
                recorded: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Record `key` as handled now.
    pub fn insert(&self, key: K) {
        self.insert_at(key, Instant::now());
    }

    /// Whether `key` was recorded within the TTL. Expired entries are dropped.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn remove(&self, key: &K) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recorded
            .remove(key);
    }

    /// Live and not yet collected entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recorded
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at(&self, key: K, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(entries.last_sweep) >= self.ttl {
            let ttl = self.ttl;
            entries
                .recorded
                .retain(|_, recorded| now.saturating_duration_since(*recorded) < ttl);
            entries.last_sweep = now;
        }
        entries.recorded.insert(key, now);
    }

    fn contains_at(&self, key: &K, now: Instant) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.recorded.get(key) {
            Some(recorded) if now.saturating_duration_since(*recorded) < self.ttl => true,
            Some(_) => {
                entries.recorded.remove(key);
                false
            }
            None => false,
        }
    }
}
