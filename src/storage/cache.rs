//! Shared block cache
//!
//! Decoded (decompressed, checksum-verified) blocks keyed by
//! `(table cache id, block offset)`. Capacity is measured in bytes, so one
//! cache can be handed to several database instances through `Options`.

use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use super::sstable::Block;

/// Default capacity when the caller does not supply a cache
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 8 * 1024 * 1024;

type CacheKey = (u64, u64);

struct CacheState {
    lru: LruCache<CacheKey, Block>,
    usage: usize,
}

/// Byte-bounded LRU of decoded blocks
pub struct BlockCache {
    state: Mutex<CacheState>,
    capacity: usize,
    next_id: AtomicU64,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                lru: LruCache::unbounded(),
                usage: 0,
            }),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocate a key space for one opened table.
    pub fn new_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, cache_id: u64, offset: u64, block: Block) {
        let charge = block.size();
        if charge > self.capacity {
            return;
        }
        let mut state = self.state.lock();
        if let Some(old) = state.lru.put((cache_id, offset), block) {
            state.usage -= old.size();
        }
        state.usage += charge;
        while state.usage > self.capacity {
            match state.lru.pop_lru() {
                Some((_, evicted)) => state.usage -= evicted.size(),
                None => break,
            }
        }
    }

    pub fn lookup(&self, cache_id: u64, offset: u64) -> Option<Block> {
        self.state.lock().lru.get(&(cache_id, offset)).cloned()
    }

    /// Bytes currently charged against the capacity
    pub fn total_charge(&self) -> usize {
        self.state.lock().usage
    }

    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_CACHE_CAPACITY)
    }
}
