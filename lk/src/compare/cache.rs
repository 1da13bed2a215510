//! Identity-keyed memoization for the domain comparators
//!
//! Entries are keyed by the addresses of the two compared `Arc`s, not by
//! their content. Each entry holds `Weak` references to both operands: the
//! allocation behind a `Weak` is never reused while the entry exists, so an
//! address pair cannot alias a different object, and an entry whose operand
//! has been dropped is a miss. Capacity is bounded; the least recently used
//! entry is evicted first.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which comparison call site an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparatorKind {
    AuthUser,
    Profile,
    Coach,
}

type Operand = Weak<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: ComparatorKind,
    left: usize,
    right: usize,
}

struct CacheEntry {
    left: Operand,
    right: Operand,
    equal: bool,
    last_used: u64,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.left.strong_count() > 0 && self.right.strong_count() > 0
    }
}

/// Bounded LRU of prior comparison results
pub struct ComparisonCache {
    entries: HashMap<CacheKey, CacheEntry>,
    capacity: usize,
    tick: u64,
}

impl ComparisonCache {
    /// Create a cache holding at most `capacity` pairs (zero disables caching)
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ComparisonCache::new: called");
        Self {
            entries: HashMap::new(),
            capacity,
            tick: 0,
        }
    }

    fn key<T>(kind: ComparatorKind, left: &Arc<T>, right: &Arc<T>) -> CacheKey {
        CacheKey {
            kind,
            left: Arc::as_ptr(left) as *const () as usize,
            right: Arc::as_ptr(right) as *const () as usize,
        }
    }

    /// Look up a prior result for this exact pair of objects
    pub fn get<T>(&mut self, kind: ComparatorKind, left: &Arc<T>, right: &Arc<T>) -> Option<bool> {
        let key = Self::key(kind, left, right);
        self.tick += 1;
        let tick = self.tick;

        match self.entries.get_mut(&key) {
            Some(entry) if entry.is_live() => {
                entry.last_used = tick;
                return Some(entry.equal);
            }
            None => return None,
            Some(_) => {}
        }

        debug!(?kind, "ComparisonCache::get: dropping entry with released operand");
        self.entries.remove(&key);
        None
    }

    /// Record the result for this pair of objects
    pub fn insert<T>(&mut self, kind: ComparatorKind, left: &Arc<T>, right: &Arc<T>, equal: bool)
    where
        T: Any + Send + Sync,
    {
        if self.capacity == 0 {
            return;
        }

        let key = Self::key(kind, left, right);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict();
        }

        self.tick += 1;
        let left_ref: Weak<T> = Arc::downgrade(left);
        let right_ref: Weak<T> = Arc::downgrade(right);
        let left_ref: Operand = left_ref;
        let right_ref: Operand = right_ref;
        self.entries.insert(
            key,
            CacheEntry {
                left: left_ref,
                right: right_ref,
                equal,
                last_used: self.tick,
            },
        );
    }

    /// Drop released entries, then the least recently used one if still full
    fn evict(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        if self.entries.len() < before {
            debug!(released = before - self.entries.len(), "ComparisonCache::evict: purged released entries");
        }

        if self.entries.len() >= self.capacity
            && let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| *key)
        {
            debug!(?oldest.kind, "ComparisonCache::evict: evicting least recently used");
            self.entries.remove(&oldest);
        }
    }

    /// Number of cached pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.tick = 0;
    }
}

impl std::fmt::Debug for ComparisonCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
