//! Per-scope member type cache.
//!
//! # Responsibility
//! - Front repository reads with a bounded LRU keyed by id, key and alias.
//! - Evict every key form of an aggregate on write.
//!
//! # Invariants
//! - The cache is never authoritative; a miss always falls through to storage.
//! - Alias keys are ASCII-lowercased, matching SQLite `COLLATE NOCASE`.
//! - Eviction is per aggregate; writing one member type never evicts another.
//! - Every key form ever cached for an id stays reachable through the form
//!   index until invalidated, even after LRU eviction of the id entry.

use crate::model::member_type::{MemberType, MemberTypeKey};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lookup forms accepted by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(i64),
    Key(MemberTypeKey),
    Alias(String),
}

impl CacheKey {
    /// Builds a normalized alias key.
    pub fn alias(alias: &str) -> Self {
        Self::Alias(alias.trim().to_ascii_lowercase())
    }
}

/// Cache counters snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of live key entries (up to three per aggregate).
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// LRU cache of reconciled member types.
pub struct MemberTypeCache {
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemberTypeCache {
    /// Creates a cache holding at most `capacity` key entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(capacity),
                forms: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the cached aggregate, if any.
    pub fn get(&self, key: &CacheKey) -> Option<MemberType> {
        let mut entries = self.entries.lock();
        match entries.lru.get(key) {
            Some(member_type) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(member_type.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Caches an aggregate under its id, key and alias.
    ///
    /// Aggregates without identity are ignored.
    pub fn insert(&self, member_type: &MemberType) {
        if !member_type.has_identity() {
            return;
        }
        let mut entries = self.entries.lock();
        entries.forget(member_type.id);
        for key in key_forms(member_type) {
            entries.lru.put(key, member_type.clone());
        }
        entries
            .forms
            .insert(member_type.id, (member_type.key, CacheKey::alias(&member_type.alias)));
    }

    /// Evicts every key form of `member_type`.
    ///
    /// Forms recorded when the aggregate was cached are evicted as well, so a
    /// renamed aggregate is no longer reachable under its previous alias.
    pub fn invalidate(&self, member_type: &MemberType) {
        let mut entries = self.entries.lock();
        entries.forget(member_type.id);
        for key in key_forms(member_type) {
            entries.pop_owned(&key, member_type.id);
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.lru.clear();
        entries.forms.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            entries: entries.lru.len(),
            capacity: entries.lru.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

struct Entries {
    lru: LruCache<CacheKey, MemberType>,
    /// Key and alias each cached id was stored under.
    forms: HashMap<i64, (MemberTypeKey, CacheKey)>,
}

impl Entries {
    /// Evicts every key form recorded for `id`.
    fn forget(&mut self, id: i64) {
        self.lru.pop(&CacheKey::Id(id));
        if let Some((key, alias)) = self.forms.remove(&id) {
            self.pop_owned(&CacheKey::Key(key), id);
            self.pop_owned(&alias, id);
        }
    }

    /// Pops `key` only while it still maps to aggregate `id`.
    fn pop_owned(&mut self, key: &CacheKey, id: i64) {
        if self.lru.peek(key).is_some_and(|cached| cached.id == id) {
            self.lru.pop(key);
        }
    }
}

fn key_forms(member_type: &MemberType) -> [CacheKey; 3] {
    [
        CacheKey::Id(member_type.id),
        CacheKey::Key(member_type.key),
        CacheKey::alias(&member_type.alias),
    ]
}
