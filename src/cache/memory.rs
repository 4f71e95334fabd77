//! In-process overlay over the disk tier

use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::debug;

use super::entry::CacheEntry;

/// Memory tier: an LRU map of recent entries.
///
/// Expiry is checked lazily on access; expired entries are evicted by the
/// lookup that finds them. The capacity bound keeps memory flat regardless
/// of how many distinct images have been seen, since the disk tier holds
/// the authoritative copy.
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
    max_age: u64,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize, max_age: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_age,
        }
    }

    /// Fetch a live entry, evicting it if it has expired
    pub async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(fingerprint) {
            Some(entry) if !entry.is_expired(self.max_age) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!("Evicting expired memory entry: {}", fingerprint);
            entries.pop(fingerprint);
        }
        None
    }

    pub async fn put(&self, fingerprint: &str, entry: CacheEntry) {
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.push(fingerprint.to_string(), entry)
            && evicted != fingerprint
        {
            debug!("Memory tier full, evicted least recently used: {}", evicted);
        }
    }

    pub async fn remove(&self, fingerprint: &str) -> bool {
        self.entries.lock().await.pop(fingerprint).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }
}
