//! Single-flight decision cache with TTL expiry
//!
//! Each key maps to a slot holding a `tokio::sync::OnceCell`. The first
//! caller for a key runs the computation; callers arriving meanwhile await
//! the same cell. The map shard lock is only held while picking the slot,
//! never across the computation, so unrelated keys proceed in parallel.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use blake3::Hasher;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::roles::RoleSource;
use crate::types::{Decision, Identity};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub capacity: usize,

    /// Time-to-live for cached decisions
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}

/// Cache key type (BLAKE3 hash)
type CacheKey = [u8; 32];

/// Cached entry with TTL
#[derive(Clone)]
struct CachedEntry {
    decision: Decision,
    role_source: Option<RoleSource>,
    cached_at: Instant,
}

/// One key's single-flight cell
struct Slot {
    cell: OnceCell<CachedEntry>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// In-flight slots never expire
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cell
            .get()
            .map(|entry| entry.cached_at.elapsed() > ttl)
            .unwrap_or(false)
    }

    fn is_settled(&self) -> bool {
        self.cell.initialized()
    }
}

/// How a decision was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Served from a settled entry
    Hit,
    /// This caller ran the computation
    Computed,
    /// This caller waited on another caller's computation
    Coalesced,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

/// Memoizes decisions per (subject email, resource key)
///
/// Provides:
/// - Single-flight computation per key
/// - TTL-based expiration, no push invalidation
/// - Capacity bound with expired-first eviction
/// - BLAKE3 hashing for cache keys
pub struct AccessDecisionCache {
    entries: DashMap<CacheKey, Arc<Slot>>,
    config: CacheConfig,
    counters: Counters,
}

impl AccessDecisionCache {
    /// Create a new decision cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            counters: Counters::default(),
        }
    }

    /// Cached decision for the key, or the result of `compute`
    ///
    /// Concurrent callers for one key share a single run of `compute`.
    /// Fault denials reach those callers but are not kept afterwards.
    pub async fn get_or_compute<F, Fut>(
        &self,
        identity: &Identity,
        resource_key: &str,
        compute: F,
    ) -> Decision
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Decision>,
    {
        self.lookup_or_compute(identity, resource_key, compute).await.0
    }

    /// Like [`Self::get_or_compute`], also reporting how the decision was obtained
    pub async fn lookup_or_compute<F, Fut>(
        &self,
        identity: &Identity,
        resource_key: &str,
        compute: F,
    ) -> (Decision, CacheLookup)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Decision>,
    {
        let (decision, _, lookup) = self
            .lookup_or_evaluate(identity, resource_key, move || async move {
                (compute().await, None)
            })
            .await;
        (decision, lookup)
    }

    /// Like [`Self::lookup_or_compute`], keeping the role provenance of the
    /// computation with the entry so hits and waiters report it too
    pub async fn lookup_or_evaluate<F, Fut>(
        &self,
        identity: &Identity,
        resource_key: &str,
        compute: F,
    ) -> (Decision, Option<RoleSource>, CacheLookup)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (Decision, Option<RoleSource>)>,
    {
        let key = Self::compute_key(identity.subject_email(), resource_key);
        let slot = self.slot_for(key);

        if let Some(entry) = slot.cell.get() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return (entry.decision.clone(), entry.role_source, CacheLookup::Hit);
        }

        let mut computed = false;
        let computed_flag = &mut computed;
        let entry = slot
            .cell
            .get_or_init(move || async move {
                *computed_flag = true;
                let (decision, role_source) = compute().await;
                CachedEntry {
                    decision,
                    role_source,
                    cached_at: Instant::now(),
                }
            })
            .await;
        let decision = entry.decision.clone();
        let role_source = entry.role_source;

        if !computed {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            return (decision, role_source, CacheLookup::Coalesced);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        if !decision.is_cacheable() {
            debug!("Not retaining {} decision for {}", decision.reason, resource_key);
            self.entries
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
        }

        (decision, role_source, CacheLookup::Computed)
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Current slot for a key, replacing it when expired
    fn slot_for(&self, key: CacheKey) -> Arc<Slot> {
        let existing = self.entries.get(&key).map(|slot| Arc::clone(slot.value()));
        if let Some(slot) = existing {
            if !slot.is_expired(self.config.ttl) {
                return slot;
            }
        }

        if self.entries.len() >= self.config.capacity {
            self.evict();
        }

        let mut entry = self.entries.entry(key).or_insert_with(|| Arc::new(Slot::new()));
        if entry.is_expired(self.config.ttl) {
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            *entry = Arc::new(Slot::new());
        }
        Arc::clone(entry.value())
    }

    /// Compute cache key from subject and resource key
    fn compute_key(subject_email: &str, resource_key: &str) -> CacheKey {
        let mut hasher = Hasher::new();

        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        hasher.update(&(subject_email.len() as u64).to_le_bytes());
        hasher.update(subject_email.as_bytes());
        hasher.update(&(resource_key.len() as u64).to_le_bytes());
        hasher.update(resource_key.as_bytes());

        *hasher.finalize().as_bytes()
    }

    /// Drop expired entries, then about 10% of settled ones if still full
    fn evict(&self) {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(ttl));

        if self.entries.len() >= self.config.capacity {
            let to_remove = (self.config.capacity / 10).max(1);
            let mut removed = 0;
            self.entries.retain(|_, slot| {
                if removed < to_remove && slot.is_settled() {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }

        let evicted = before.saturating_sub(self.entries.len());
        self.counters
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        debug!("Evicted {} cache entries", evicted);
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined an in-flight computation
    pub coalesced: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
