/*
    trackfile

    --------------------------------------------------------------------------

    src/cache.rs

    The optional shared read cache. A two-segment LRU (probation,
    protection) keyed by `(unit, track)`, size-bounded in bytes, shrinkable
    online, with O(entries-owned-by-unit) invalidation on eject.

    The `lru` crate backs each of the two segments; the probation/protection
    promotion policy layered on top is built directly against the 2Q-style
    cache behavior this driver needs.
*/

use crate::geometry::SECTOR_SIZE;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// One track's worth of the smallest supported geometry (DD, 11
/// sectors/track) -- the minimum meaningful cache size is one track.
pub const MIN_CACHE_BYTES: usize = 11 * SECTOR_SIZE;

pub type CacheKey = (u32, usize);

struct CacheInner {
    probation: LruCache<CacheKey, Vec<u8>>,
    protection: LruCache<CacheKey, Vec<u8>>,
    /// unit -> set of track indices currently cached for that unit, across
    /// both segments, so `invalidate_unit` is O(entries owned by the unit)
    /// rather than a full scan.
    owned_by_unit: HashMap<u32, Vec<usize>>,
    max_bytes: usize,
    used_bytes: usize,
}

impl CacheInner {
    fn new(max_bytes: usize) -> Self {
        // lru::LruCache requires a nonzero capacity; the byte budget is what
        // actually bounds memory, so the entry-count capacity is effectively
        // unbounded (one entry per sector is the practical ceiling).
        let unbounded = NonZeroUsize::new(usize::MAX).unwrap();
        Self {
            probation: LruCache::new(unbounded),
            protection: LruCache::new(unbounded),
            owned_by_unit: HashMap::new(),
            max_bytes,
            used_bytes: 0,
        }
    }

    fn note_owned(&mut self, unit: u32, track: usize) {
        self.owned_by_unit.entry(unit).or_default().push(track);
    }

    fn forget_owned(&mut self, unit: u32, track: usize) {
        if let Some(tracks) = self.owned_by_unit.get_mut(&unit) {
            tracks.retain(|&t| t != track);
        }
    }

    fn evict_to_bound(&mut self) {
        while self.used_bytes > self.max_bytes {
            if let Some((key, bytes)) = self.probation.pop_lru() {
                self.used_bytes -= bytes.len();
                self.forget_owned(key.0, key.1);
                continue;
            }
            if let Some((key, bytes)) = self.protection.pop_lru() {
                self.used_bytes -= bytes.len();
                self.forget_owned(key.0, key.1);
                continue;
            }
            break;
        }
    }

    fn insert_probation(&mut self, key: CacheKey, bytes: Vec<u8>) {
        self.used_bytes += bytes.len();
        self.note_owned(key.0, key.1);
        if let Some(old) = self.probation.put(key, bytes) {
            self.used_bytes -= old.len();
        }
        self.evict_to_bound();
    }
}

/// The shared, optional read cache. Disabled until `max_bytes > 0`.
pub struct SharedCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl SharedCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::new(max_bytes)),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").max_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").used_bytes
    }

    /// Updates hit counters and moves the entry within its list; promotes
    /// probation -> protection on a second hit.
    pub fn lookup(&self, unit: u32, track: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let key = (unit, track);

        if let Some(bytes) = inner.protection.get(&key) {
            return Some(bytes.clone());
        }

        if let Some(bytes) = inner.probation.pop(&key) {
            // Second access: promote probation -> protection.
            inner.protection.put(key, bytes.clone());
            return Some(bytes);
        }

        None
    }

    /// On hit, overwrites bytes and refreshes position; on miss, inserts
    /// only when `allow_insert` is true (reads set it true, writes set it
    /// false).
    pub fn update(&self, unit: u32, track: usize, bytes: &[u8], allow_insert: bool) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let key = (unit, track);

        if let Some(existing) = inner.protection.get_mut(&key) {
            inner.used_bytes = inner.used_bytes - existing.len() + bytes.len();
            *existing = bytes.to_vec();
            inner.evict_to_bound();
            return;
        }
        if let Some(existing) = inner.probation.get_mut(&key) {
            inner.used_bytes = inner.used_bytes - existing.len() + bytes.len();
            *existing = bytes.to_vec();
            inner.evict_to_bound();
            return;
        }

        if allow_insert {
            inner.insert_probation(key, bytes.to_vec());
        }
    }

    /// O(entries-owned-by-unit), using the per-unit node list the worker
    /// maintains.
    pub fn invalidate_unit(&self, unit: u32) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let tracks = inner.owned_by_unit.remove(&unit).unwrap_or_default();
        for track in tracks {
            let key = (unit, track);
            if let Some(bytes) = inner.probation.pop(&key) {
                inner.used_bytes -= bytes.len();
            }
            if let Some(bytes) = inner.protection.pop(&key) {
                inner.used_bytes -= bytes.len();
            }
        }
    }

    /// A failed write invalidates just the one affected entry.
    pub fn invalidate_one(&self, unit: u32, track: usize) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let key = (unit, track);
        if let Some(bytes) = inner.probation.pop(&key) {
            inner.used_bytes -= bytes.len();
        }
        if let Some(bytes) = inner.protection.pop(&key) {
            inner.used_bytes -= bytes.len();
        }
        inner.forget_owned(unit, track);
    }

    /// If smaller, evicts from probation then protection until under
    /// bound; never clears entries on grow.
    pub fn resize(&self, new_max_bytes: usize) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.max_bytes = new_max_bytes;
        inner.evict_to_bound();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_after_insert() {
        let cache = SharedCache::new(1_000_000);
        assert!(cache.lookup(0, 0).is_none());
        cache.update(0, 0, &[1, 2, 3], true);
        assert_eq!(cache.lookup(0, 0), Some(vec![1, 2, 3]));
    }

    #[test]
    fn write_does_not_insert_on_miss() {
        let cache = SharedCache::new(1_000_000);
        cache.update(0, 0, &[1, 2, 3], false);
        assert!(cache.lookup(0, 0).is_none());
    }

    #[test]
    fn second_hit_promotes_to_protection() {
        let cache = SharedCache::new(1_000_000);
        cache.update(0, 5, &[9], true);
        // First access (the insert itself does not count): this lookup is
        // the first hit, taken from probation.
        assert_eq!(cache.lookup(0, 5), Some(vec![9]));
        // Second hit promotes into protection; verify it survives heavy
        // probation churn that would otherwise evict a probation entry.
        assert_eq!(cache.lookup(0, 5), Some(vec![9]));
        for t in 0..10_000 {
            cache.update(1, t, &[0u8; 64], true);
        }
        assert_eq!(cache.lookup(0, 5), Some(vec![9]));
    }

    #[test]
    fn invalidate_unit_removes_only_that_units_entries() {
        let cache = SharedCache::new(1_000_000);
        cache.update(0, 0, &[1], true);
        cache.update(1, 0, &[2], true);
        cache.invalidate_unit(0);
        assert!(cache.lookup(0, 0).is_none());
        assert_eq!(cache.lookup(1, 0), Some(vec![2]));
    }

    #[test]
    fn total_bytes_never_exceeds_bound() {
        let cache = SharedCache::new(256);
        for t in 0..100 {
            cache.update(0, t, &[0u8; 64], true);
            assert!(cache.used_bytes() <= 256);
        }
    }

    #[test]
    fn resize_smaller_evicts_down_to_bound() {
        let cache = SharedCache::new(10_000);
        for t in 0..50 {
            cache.update(0, t, &[0u8; 64], true);
        }
        cache.resize(256);
        assert!(cache.used_bytes() <= 256);
    }

    #[test]
    fn resize_larger_never_clears_existing_entries() {
        let cache = SharedCache::new(256);
        cache.update(0, 0, &[1, 2, 3], true);
        cache.resize(1_000_000);
        assert_eq!(cache.lookup(0, 0), Some(vec![1, 2, 3]));
    }

    #[test]
    fn failed_write_invalidates_single_entry() {
        let cache = SharedCache::new(1_000_000);
        cache.update(0, 1, &[7], true);
        cache.invalidate_one(0, 1);
        assert!(cache.lookup(0, 1).is_none());
    }
}
