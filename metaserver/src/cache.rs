//! Bounded LRU cache from chunk id to the datanode addresses last observed
//! to hold it. Purely advisory; the namespace maps stay authoritative.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLocationInfo {
    pub chunk_id: String,
    pub datanode_addresses: Vec<String>,
}

pub struct LocationCache {
    entries: Mutex<LruCache<String, ChunkLocationInfo>>,
}

impl LocationCache {
    pub fn new(capacity: usize) -> Self {
        // a requested capacity of zero is silently promoted to one
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Inserts or updates an entry, marking it most recently used. The LRU
    /// entry is evicted first when the cache is full.
    pub fn put(&self, chunk_id: &str, info: ChunkLocationInfo) {
        self.entries.lock().unwrap().put(chunk_id.to_owned(), info);
    }

    /// A hit refreshes recency, so this is not a read-only operation.
    pub fn get(&self, chunk_id: &str) -> Option<ChunkLocationInfo> {
        self.entries.lock().unwrap().get(chunk_id).cloned()
    }

    pub fn remove(&self, chunk_id: &str) {
        self.entries.lock().unwrap().pop(chunk_id);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
