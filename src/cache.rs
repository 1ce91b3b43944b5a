//! Decompressed-chunk cache with per-chunk in-flight locks.
//!
//! Two jobs live here. The first is a bounded LRU of recently decompressed
//! payloads keyed by chunk logical start, so a seek back into a hot chunk
//! skips the transform. The second is work deduplication: [`lock`] admits
//! exactly one decompressor per key at a time, so concurrent cursors
//! hitting the same cold chunk inflate it once instead of N times.
//!
//! ## Lock Protocol
//!
//! The held-key set lives under one mutex with a condvar. `lock` inserts
//! the key or waits; a woken waiter loops and re-attempts insertion, it
//! does not inherit ownership. Unlock removes the key and wakes all
//! waiters. The returned [`ChunkLockGuard`] unlocks on drop, so the
//! pairing survives every error path.
//!
//! The cache is a performance aid, not a correctness component: a missing
//! entry only costs a decompression, and allocation failure on insert
//! clears the cache and carries on.
//!
//! [`lock`]: DecompressionCache::lock

use std::num::NonZeroUsize;

use hashbrown::HashSet;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

pub struct DecompressionCache {
    entries: Mutex<LruCache<u64, Vec<u8>>>,
    capacity: usize,
    held: Mutex<HashSet<u64>>,
    released: Condvar,
}

impl DecompressionCache {
    /// Cache holding up to `capacity` decompressed chunks; a zero capacity
    /// is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(bound)),
            capacity: bound.get(),
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Blocks until no other holder owns `key`, then takes it. The guard
    /// releases the key and wakes all waiters on drop.
    pub fn lock(&self, key: u64) -> ChunkLockGuard<'_> {
        let mut held = self.held.lock();
        while !held.insert(key) {
            self.released.wait(&mut held);
        }
        drop(held);
        ChunkLockGuard { cache: self, key }
    }

    fn unlock(&self, key: u64) {
        let mut held = self.held.lock();
        held.remove(&key);
        drop(held);
        self.released.notify_all();
    }

    /// Copy of the cached payload, refreshing its recency. A reclaimed or
    /// never-stored entry is a miss.
    pub fn get(&self, key: u64) -> Option<Vec<u8>> {
        self.entries.lock().get(&key).cloned()
    }

    /// Stores a copy of `payload`, evicting the least recently used entry
    /// at capacity. Allocation failure clears the cache instead of
    /// propagating.
    pub fn put(&self, key: u64, payload: &[u8]) {
        let mut copy = Vec::new();
        if copy.try_reserve_exact(payload.len()).is_err() {
            debug!(len = payload.len(), "chunk cache allocation failed, clearing");
            self.entries.lock().clear();
            return;
        }
        copy.extend_from_slice(payload);

        let mut entries = self.entries.lock();
        if entries.len() > self.capacity {
            entries.clear();
        }
        entries.put(key, copy);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive in-flight claim on one chunk key.
pub struct ChunkLockGuard<'a> {
    cache: &'a DecompressionCache,
    key: u64,
}

impl Drop for ChunkLockGuard<'_> {
    fn drop(&mut self) {
        self.cache.unlock(self.key);
    }
}
