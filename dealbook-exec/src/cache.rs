//! In-process cache for exchange symbol filters.
//!
//! Filters change rarely, so reads within a fixed TTL are served from
//! memory and a stale-within-TTL snapshot is acceptable. Entries are
//! immutable `Arc` snapshots replaced wholesale on refresh; there is no
//! background refresh and no invalidation on write.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::filters::SymbolFilters;

/// Default filter TTL.
pub const FILTER_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    filters: Arc<SymbolFilters>,
    fetched_at: Instant,
}

/// TTL cache of `SymbolFilters`, keyed by uppercased symbol.
pub struct FilterCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl FilterCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a live snapshot, or `None` when absent or expired.
    pub fn get(&self, symbol: &str) -> Option<Arc<SymbolFilters>> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&symbol.to_uppercase())
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.filters))
    }

    /// Store a fresh snapshot, replacing any previous entry.
    pub fn insert(&self, symbol: &str, filters: SymbolFilters) -> Arc<SymbolFilters> {
        let snapshot = Arc::new(filters);
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            symbol.to_uppercase(),
            CacheEntry {
                filters: Arc::clone(&snapshot),
                fetched_at: Instant::now(),
            },
        );
        snapshot
    }
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new(FILTER_TTL)
    }
}

// =============================================================================
// Tests
// =============================================================================
