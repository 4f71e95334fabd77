//! Lookup order, write-through and reclamation across both cache tiers

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::disk::{DiskCacheStore, SweepReport};
use super::entry::CacheEntry;
use super::memory::MemoryCacheStore;
use crate::analyzer::Analyzer;
use crate::errors::{BackendError, BackendResult, StorageResult};

/// Where a resolved result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Disk,
    Backend,
}

/// A result for one fingerprint
#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: Value,
    pub cache_key: String,
    pub tier: CacheTier,
}

/// Entry counts per tier
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub memory_cache_count: usize,
    pub disk_cache_count: usize,
}

/// Per-fingerprint locks for misses that are being analysed
#[derive(Default)]
struct InFlight {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InFlight {
    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock for `key` once no other caller is waiting on it
    async fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Clones are only made and dropped under the map lock, so the
        // count read here cannot include a caller that already released.
        drop(lock);
        if locks
            .get(key)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(key);
        }
    }
}

/// Resolves analysis requests through memory, disk and finally the backend.
///
/// Per request: memory hit → done; disk hit → promote to memory, done;
/// otherwise call the backend and persist disk first, then memory. Backend
/// failures persist nothing. Storage failures are logged and treated as a
/// miss so that the cache never blocks an analysis.
pub struct CacheCoordinator {
    memory: MemoryCacheStore,
    disk: DiskCacheStore,
    analyzer: Arc<dyn Analyzer>,
    backend_timeout: Duration,
    single_flight: bool,
    in_flight: InFlight,
}

impl CacheCoordinator {
    pub fn new(
        memory: MemoryCacheStore,
        disk: DiskCacheStore,
        analyzer: Arc<dyn Analyzer>,
        backend_timeout: Duration,
        single_flight: bool,
    ) -> Self {
        Self {
            memory,
            disk,
            analyzer,
            backend_timeout,
            single_flight,
            in_flight: InFlight::default(),
        }
    }

    pub fn disk(&self) -> &DiskCacheStore {
        &self.disk
    }

    pub fn memory(&self) -> &MemoryCacheStore {
        &self.memory
    }

    /// Return the result for `fingerprint`, analysing `image` on a miss
    pub async fn resolve(
        &self,
        fingerprint: &str,
        image: &[u8],
        mime_type: &str,
    ) -> BackendResult<Resolution> {
        if let Some(resolution) = self.lookup(fingerprint).await {
            return Ok(resolution);
        }

        if !self.single_flight {
            return self.analyze_and_persist(fingerprint, image, mime_type).await;
        }

        let lock = self.in_flight.lock_for(fingerprint).await;
        let outcome = {
            let _guard = lock.lock().await;
            // A caller that held the lock before us may have filled the cache.
            match self.lookup(fingerprint).await {
                Some(resolution) => Ok(resolution),
                None => self.analyze_and_persist(fingerprint, image, mime_type).await,
            }
        };
        self.in_flight.release(fingerprint, lock).await;
        outcome
    }

    /// Check memory, then disk (promoting disk hits into memory)
    async fn lookup(&self, fingerprint: &str) -> Option<Resolution> {
        self.cached_entry(fingerprint)
            .await
            .map(|(entry, tier)| Resolution {
                result: entry.result,
                cache_key: entry.cache_key,
                tier,
            })
    }

    /// Live entry for `fingerprint` from either tier, without analysing
    pub async fn cached(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.cached_entry(fingerprint).await.map(|(entry, _)| entry)
    }

    async fn cached_entry(&self, fingerprint: &str) -> Option<(CacheEntry, CacheTier)> {
        if let Some(entry) = self.memory.get(fingerprint).await {
            debug!("Memory cache hit: {}", fingerprint);
            return Some((entry, CacheTier::Memory));
        }

        match self.disk.load(fingerprint).await {
            Ok(Some(entry)) => {
                debug!("Disk cache hit: {}", fingerprint);
                self.memory.put(fingerprint, entry.clone()).await;
                Some((entry, CacheTier::Disk))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Disk cache read failed for {}, treating as miss: {}", fingerprint, e);
                None
            }
        }
    }

    async fn analyze_and_persist(
        &self,
        fingerprint: &str,
        image: &[u8],
        mime_type: &str,
    ) -> BackendResult<Resolution> {
        info!(
            "Analyzing {} with {} ({} bytes, {})",
            fingerprint,
            self.analyzer.name(),
            image.len(),
            mime_type
        );
        let start_time = Instant::now();
        let result = tokio::time::timeout(
            self.backend_timeout,
            self.analyzer.analyze(image, mime_type),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.backend_timeout))??;
        info!(
            "Analysis of {} finished in {:.2}s",
            fingerprint,
            start_time.elapsed().as_secs_f64()
        );

        self.persist(fingerprint, &result).await;
        Ok(Resolution {
            result,
            cache_key: fingerprint.to_string(),
            tier: CacheTier::Backend,
        })
    }

    /// Write disk first so a crash between the writes keeps the durable copy
    async fn persist(&self, fingerprint: &str, result: &Value) {
        let entry = match self.disk.save(fingerprint, result).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to persist cache entry {}: {}", fingerprint, e);
                CacheEntry::new(fingerprint, result.clone())
            }
        };
        self.memory.put(fingerprint, entry).await;
    }

    /// Delete confirmed-expired disk entries and drop them from memory
    pub async fn sweep(&self, max_age: u64) -> StorageResult<SweepReport> {
        let report = self.disk.sweep(max_age).await?;
        for key in &report.deleted {
            self.memory.remove(key).await;
        }
        Ok(report)
    }

    /// Remove `fingerprint` from both tiers.
    ///
    /// The memory entry is dropped even when deleting the file fails.
    pub async fn evict(&self, fingerprint: &str) -> StorageResult<bool> {
        self.memory.remove(fingerprint).await;
        self.disk.remove(fingerprint).await
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            memory_cache_count: self.memory.len().await,
            disk_cache_count: self.disk.len().await,
        }
    }
}
