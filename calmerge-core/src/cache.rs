//! In-memory cache of fetched calendar bytes.
//!
//! Entries expire a fixed time after insertion. When the cache is full the
//! least recently used entry is evicted to make room.
//!
//! A lookup followed by a fetch and a store is not atomic: two requests that
//! miss on the same source at the same time both fetch it, and the cache
//! keeps whichever store lands last.

use std::sync::Arc;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;

/// Default maximum number of cached sources.
pub const DEFAULT_CAPACITY: usize = 100;

/// TTL- and size-bounded store of raw calendar bytes keyed by source identifier.
#[derive(Clone)]
pub struct SourceCache {
    entries: Cache<String, Arc<[u8]>>,
    ttl: Duration,
}

impl SourceCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity.max(1) as u64)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key: Arc<String>, _, cause| {
                if cause.was_evicted() {
                    tracing::debug!(source = %key, ?cause, "calendar evicted from cache");
                }
            })
            .build();

        SourceCache { entries, ttl }
    }

    /// Cache whose entries expire `minutes` after insertion.
    pub fn with_ttl_minutes(minutes: u64, capacity: usize) -> Self {
        Self::new(Duration::from_secs(minutes * 60), capacity)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached bytes for `source`, if present and not expired.
    pub fn get(&self, source: &str) -> Option<Arc<[u8]>> {
        self.entries.get(source)
    }

    /// Store `bytes` for `source`, replacing any previous entry.
    pub fn put(&self, source: &str, bytes: Arc<[u8]>) {
        self.entries.insert(source.to_string(), bytes);
    }

    /// Apply pending evictions and expirations now rather than on the
    /// cache's own schedule.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
