//! Instrumented comparisons and the domain comparators

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::cache::{ComparatorKind, ComparisonCache};
use super::config::ComparisonConfig;
use super::entities::{AuthUser, Coach, Profile};
use super::shallow::shallow_equal;

/// Lookups needed before a low hit rate is worth reporting
const MIN_LOOKUPS_FOR_HIT_RATE: u64 = 100;

/// Hit rate below which the cache is reported as ineffective
const LOW_HIT_RATE: f64 = 0.10;

/// Global counters (thread-safe)
#[derive(Debug, Default)]
struct Counters {
    total_comparisons: AtomicU64,
    total_nanos: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Snapshot of comparison counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStats {
    pub total_comparisons: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_time: Duration,
    pub average_time: Duration,
    pub hit_rate: f64,
    pub cache_len: usize,
}

/// Session-owned comparison layer.
///
/// Every call is counted and timed. The domain comparators consult an
/// identity-keyed cache so repeated re-evaluation of the same two objects
/// skips the field walk.
#[derive(Debug)]
pub struct Comparator {
    config: ComparisonConfig,
    counters: Counters,
    cache: Mutex<ComparisonCache>,
}

impl Comparator {
    pub fn new(config: ComparisonConfig) -> Self {
        debug!(?config, "Comparator::new: called");
        Self {
            cache: Mutex::new(ComparisonCache::new(config.cache_capacity)),
            config,
            counters: Counters::default(),
        }
    }

    fn record(&self, started: Instant) {
        self.counters.total_comparisons.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }

    /// Counted [`shallow_equal`]
    pub fn shallow_equal(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        let started = Instant::now();
        let equal = shallow_equal(a, b);
        self.record(started);
        equal
    }

    /// Shared flow for the domain comparators: identity, one-sided absence,
    /// cache, then the field walk
    fn compare_cached<T, F>(&self, kind: ComparatorKind, a: Option<&Arc<T>>, b: Option<&Arc<T>>, fields_equal: F) -> bool
    where
        T: std::any::Any + Send + Sync,
        F: FnOnce(&T, &T) -> bool,
    {
        let started = Instant::now();
        let equal = match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) if Arc::ptr_eq(a, b) => true,
            (Some(a), Some(b)) => self.lookup_or_compute(kind, a, b, fields_equal),
            _ => false,
        };
        self.record(started);
        equal
    }

    fn lookup_or_compute<T, F>(&self, kind: ComparatorKind, a: &Arc<T>, b: &Arc<T>, fields_equal: F) -> bool
    where
        T: std::any::Any + Send + Sync,
        F: FnOnce(&T, &T) -> bool,
    {
        let Ok(mut cache) = self.cache.lock() else {
            debug!(?kind, "Comparator::lookup_or_compute: cache lock poisoned, comparing directly");
            return fields_equal(a.as_ref(), b.as_ref());
        };

        if let Some(equal) = cache.get(kind, a, b) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return equal;
        }

        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        let equal = fields_equal(a.as_ref(), b.as_ref());
        cache.insert(kind, a, b, equal);
        equal
    }

    /// Compare two signed-in identities
    pub fn compare_auth_user(&self, a: Option<&Arc<AuthUser>>, b: Option<&Arc<AuthUser>>) -> bool {
        self.compare_cached(ComparatorKind::AuthUser, a, b, |a, b| {
            a.id == b.id
                && a.email == b.email
                && a.display_name == b.display_name
                && a.email_verified == b.email_verified
                && same_sequence(&a.roles, &b.roles)
        })
    }

    /// Compare two profiles
    pub fn compare_profile(&self, a: Option<&Arc<Profile>>, b: Option<&Arc<Profile>>) -> bool {
        self.compare_cached(ComparatorKind::Profile, a, b, |a, b| {
            a.id == b.id
                && a.user_id == b.user_id
                && a.full_name == b.full_name
                && a.bio == b.bio
                && a.avatar_url == b.avatar_url
                && a.location == b.location
                && a.updated_at == b.updated_at
        })
    }

    /// Compare two coach listings
    pub fn compare_coach(&self, a: Option<&Arc<Coach>>, b: Option<&Arc<Coach>>) -> bool {
        self.compare_cached(ComparatorKind::Coach, a, b, |a, b| {
            a.id == b.id
                && a.name == b.name
                && a.headline == b.headline
                && a.hourly_rate_cents == b.hourly_rate_cents
                && a.rating == b.rating
                && a.review_count == b.review_count
                && a.verified == b.verified
                && a.avatar_url == b.avatar_url
                && same_sequence(&a.specializations, &b.specializations)
                && same_sequence(&a.languages, &b.languages)
        })
    }

    /// Snapshot the counters
    pub fn stats(&self) -> ComparisonStats {
        let total_comparisons = self.counters.total_comparisons.load(Ordering::Relaxed);
        let total_nanos = self.counters.total_nanos.load(Ordering::Relaxed);
        let cache_hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.counters.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;

        ComparisonStats {
            total_comparisons,
            cache_hits,
            cache_misses,
            total_time: Duration::from_nanos(total_nanos),
            average_time: if total_comparisons > 0 {
                Duration::from_nanos(total_nanos / total_comparisons)
            } else {
                Duration::ZERO
            },
            hit_rate: if lookups > 0 {
                cache_hits as f64 / lookups as f64
            } else {
                0.0
            },
            cache_len: self.cache.lock().map(|c| c.len()).unwrap_or(0),
        }
    }

    /// Zero every counter and clear the cache
    pub fn reset(&self) {
        debug!("Comparator::reset: called");
        self.counters.total_comparisons.store(0, Ordering::Relaxed);
        self.counters.total_nanos.store(0, Ordering::Relaxed);
        self.counters.cache_hits.store(0, Ordering::Relaxed);
        self.counters.cache_misses.store(0, Ordering::Relaxed);
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Advisory messages about comparison cost. Informational only.
    pub fn check_warnings(&self) -> Vec<String> {
        let stats = self.stats();
        let mut warnings = Vec::new();

        if stats.total_comparisons > 0 && stats.average_time > self.config.warn_avg() {
            warnings.push(format!(
                "Average comparison time {:?} exceeds {:?} over {} comparisons",
                stats.average_time,
                self.config.warn_avg(),
                stats.total_comparisons
            ));
        }

        let lookups = stats.cache_hits + stats.cache_misses;
        if lookups >= MIN_LOOKUPS_FOR_HIT_RATE && stats.hit_rate < LOW_HIT_RATE {
            warnings.push(format!(
                "Comparison cache hit rate {:.1}% over {} lookups; callers are rarely re-comparing the same objects",
                stats.hit_rate * 100.0,
                lookups
            ));
        }

        for warning in &warnings {
            warn!(%warning, "Comparator::check_warnings");
        }
        warnings
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(ComparisonConfig::default())
    }
}

/// Length, then element-wise in order. A reordering counts as a change.
fn same_sequence(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}
