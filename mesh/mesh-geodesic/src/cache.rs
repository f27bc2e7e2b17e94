//! Bounded cache of per-vertex distance fields.

use crate::distance::DistanceField;
use crate::error::GeodesicResult;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Hit, miss and eviction counts since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required a solve.
    pub misses: u64,
    /// Fields dropped to stay within capacity.
    pub evictions: u64,
}

#[derive(Debug)]
struct Entry {
    field: Arc<DistanceField>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<usize, Entry>,
    tick: u64,
}

impl LruState {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Least-recently-used map from source vertex to its distance field.
///
/// Solves run outside the lock. Two threads missing on the same source both
/// solve it and the later insert wins; the fields are identical.
#[derive(Debug)]
pub struct GeodesicCache {
    state: Mutex<LruState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl GeodesicCache {
    /// Create a cache holding at most `capacity` fields (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        // A panic while holding the lock cannot leave the map inconsistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of fields kept.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of fields currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source vertices currently cached, in no particular order.
    #[must_use]
    pub fn sources(&self) -> Vec<usize> {
        self.lock().entries.keys().copied().collect()
    }

    /// Cached field for `source`, marking it most recently used.
    #[must_use]
    pub fn get(&self, source: usize) -> Option<Arc<DistanceField>> {
        let mut state = self.lock();
        let tick = state.touch();
        let entry = state.entries.get_mut(&source)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.field))
    }

    /// Store `field` for `source`, evicting the least recently used entry if full.
    pub fn insert(&self, source: usize, field: Arc<DistanceField>) {
        let mut state = self.lock();
        let tick = state.touch();
        state.entries.insert(
            source,
            Entry {
                field,
                last_used: tick,
            },
        );

        while state.entries.len() > self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(&k, _)| k);
            let Some(oldest) = oldest else { break };
            state.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(source = oldest, capacity = self.capacity, "Evicted distance field");
        }
    }

    /// Cached field for `source`, solving with `compute` on a miss.
    ///
    /// # Errors
    ///
    /// Propagates the error from `compute`; nothing is cached in that case.
    pub fn get_or_compute<F>(&self, source: usize, compute: F) -> GeodesicResult<Arc<DistanceField>>
    where
        F: FnOnce() -> GeodesicResult<DistanceField>,
    {
        if let Some(field) = self.get(source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(field);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let field = Arc::new(compute()?);
        self.insert(source, Arc::clone(&field));
        Ok(field)
    }

    /// Drop every cached field.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
