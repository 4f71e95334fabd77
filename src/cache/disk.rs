//! Durable JSON document cache with an in-memory index

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use crate::errors::{StorageError, StorageResult};
use crate::utils::time::elapsed_since;

/// Extension of cache documents
const ENTRY_EXTENSION: &str = "json";

/// Location and modification time of an indexed cache document
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Outcome of an expiry sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Indexed documents looked at
    pub inspected: usize,
    /// Fingerprints whose documents were deleted
    pub deleted: Vec<String>,
    /// Documents that could not be read or removed
    pub failures: usize,
    pub duration_ms: u64,
}

impl SweepReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

/// Disk tier: one `{fingerprint}.json` document per analysed image.
///
/// The index is rebuilt from the directory at startup and only lists
/// documents that parsed and whose `cache_key` matches their file name.
/// Reads never delete; expired and unreadable documents are left for the
/// sweep or the operator.
pub struct DiskCacheStore {
    dir: PathBuf,
    max_age: u64,
    index: RwLock<HashMap<String, IndexedFile>>,
}

impl DiskCacheStore {
    /// Create the cache directory if needed and build the index.
    ///
    /// Failing to create the directory is the one fatal storage error.
    pub async fn open(dir: impl Into<PathBuf>, max_age: u64) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let store = Self {
            dir,
            max_age,
            index: RwLock::new(HashMap::new()),
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    /// Path of the document for `fingerprint`
    pub fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{ENTRY_EXTENSION}"))
    }

    /// Scan the cache directory and replace the index with what is found
    pub async fn rebuild_index(&self) -> StorageResult<usize> {
        info!("Scanning cache directory {}", self.dir.display());
        let start_time = std::time::Instant::now();

        let mut rebuilt = HashMap::new();
        let mut skipped = 0usize;
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;

        while let Some(dir_entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let path = dir_entry.path();
            let is_document = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ENTRY_EXTENSION));
            if !is_document {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            match self.read_document(&path).await {
                Ok(Some(entry)) if entry.cache_key == key => {
                    match fs::metadata(&path).await.and_then(|m| m.modified()) {
                        Ok(modified) => {
                            debug!("Indexed cache document: {}", key);
                            rebuilt.insert(key, IndexedFile { path, modified });
                        }
                        Err(e) => {
                            warn!("Failed to stat cache document {}: {}", path.display(), e);
                            skipped += 1;
                        }
                    }
                }
                Ok(Some(entry)) => {
                    warn!(
                        "Cache document {} carries key {}, excluded from index",
                        path.display(),
                        entry.cache_key
                    );
                    skipped += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Unreadable cache document excluded from index: {}", e);
                    skipped += 1;
                }
            }
        }

        let count = rebuilt.len();
        *self.index.write().await = rebuilt;

        info!(
            "Cache scan completed: {} documents indexed, {} excluded in {:.2}s",
            count,
            skipped,
            start_time.elapsed().as_secs_f64()
        );
        Ok(count)
    }

    /// Read and parse a document. Missing files are `Ok(None)`, parse
    /// failures are [`StorageError::Corrupt`].
    async fn read_document(&self, path: &Path) -> StorageResult<Option<CacheEntry>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::corrupt(path, e.to_string()))
    }

    /// Read the stored entry regardless of age
    pub async fn read_entry(&self, fingerprint: &str) -> StorageResult<Option<CacheEntry>> {
        self.read_document(&self.entry_path(fingerprint)).await
    }

    /// Load an entry that is still within max-age.
    ///
    /// Expired documents are reported absent and left on disk. Unparseable
    /// documents are logged and treated as a miss.
    pub async fn load(&self, fingerprint: &str) -> StorageResult<Option<CacheEntry>> {
        let entry = match self.read_entry(fingerprint).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!("Ignoring unreadable cache document for {}: {}", fingerprint, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.is_expired(self.max_age) {
            debug!("Cache entry expired: {}", fingerprint);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Persist a fresh entry for `fingerprint`.
    ///
    /// The document is written to a uniquely named temporary file and then
    /// renamed into place, so readers see either the old or the new document.
    pub async fn save(&self, fingerprint: &str, result: &Value) -> StorageResult<CacheEntry> {
        let entry = CacheEntry::new(fingerprint, result.clone());
        let contents = serde_json::to_vec_pretty(&entry)?;

        let file_path = self.entry_path(fingerprint);
        let temp_path = self
            .dir
            .join(format!("{}.{}.tmp", fingerprint, uuid::Uuid::new_v4()));

        fs::write(&temp_path, &contents)
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;

        // Rename under the index lock so a concurrent sweep cannot delete
        // the new document between the rename and the index update.
        let mut index = self.index.write().await;
        if let Err(e) = fs::rename(&temp_path, &file_path).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!(
                    "Failed to remove temporary file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(StorageError::io(&file_path, e));
        }

        let modified = fs::metadata(&file_path)
            .await
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        index.insert(
            fingerprint.to_string(),
            IndexedFile {
                path: file_path.clone(),
                modified,
            },
        );

        debug!("Saved cache document {}", file_path.display());
        Ok(entry)
    }

    /// Delete the document for `fingerprint` and drop it from the index.
    ///
    /// Returns whether a file was removed; a file that is already gone is
    /// not an error.
    pub async fn remove(&self, fingerprint: &str) -> StorageResult<bool> {
        let path = self.entry_path(fingerprint);
        let mut index = self.index.write().await;
        let removed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        index.remove(fingerprint);
        Ok(removed)
    }

    /// Delete the document for `fingerprint` only if its stored timestamp
    /// is at least `max_age` seconds old.
    ///
    /// The check and the delete happen under the index write lock, which
    /// `save` also holds across its rename.
    pub async fn remove_if_expired(
        &self,
        fingerprint: &str,
        max_age: u64,
    ) -> StorageResult<bool> {
        let path = self.entry_path(fingerprint);
        let mut index = self.index.write().await;
        match self.read_document(&path).await? {
            Some(entry) if entry.is_expired(max_age) => {}
            Some(_) => return Ok(false),
            None => {
                index.remove(fingerprint);
                return Ok(false);
            }
        }

        let removed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        index.remove(fingerprint);
        Ok(removed)
    }

    /// Delete every indexed document older than `max_age` seconds.
    ///
    /// The file modification time only preselects candidates; expiry is
    /// confirmed against the stored timestamp before deleting.
    pub async fn sweep(&self, max_age: u64) -> StorageResult<SweepReport> {
        info!("Sweeping cache documents older than {}s", max_age);
        let start_time = std::time::Instant::now();
        let max_age_duration = Duration::from_secs(max_age);
        let mut report = SweepReport::default();

        let candidates: Vec<(String, IndexedFile)> = self
            .index
            .read()
            .await
            .iter()
            .map(|(key, file)| (key.clone(), file.clone()))
            .collect();

        for (key, file) in candidates {
            report.inspected += 1;

            let modified = match fs::metadata(&file.path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Cache document already gone: {}", key);
                    self.index.write().await.remove(&key);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to stat cache document {}: {}", file.path.display(), e);
                    report.failures += 1;
                    continue;
                }
            };
            if elapsed_since(modified) < max_age_duration {
                continue;
            }

            match self.remove_if_expired(&key, max_age).await {
                Ok(true) => {
                    debug!("Deleted expired cache document: {}", key);
                    report.deleted.push(key);
                }
                Ok(false) => {}
                Err(e @ StorageError::Corrupt { .. }) => {
                    warn!("Skipping unreadable cache document during sweep: {}", e);
                    report.failures += 1;
                }
                Err(e) => {
                    warn!("Failed to delete expired cache document {}: {}", key, e);
                    report.failures += 1;
                }
            }
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Cache sweep completed: deleted {} of {} documents ({} failures) in {}ms",
            report.deleted_count(),
            report.inspected,
            report.failures,
            report.duration_ms
        );
        Ok(report)
    }

    /// Number of indexed documents
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn contains(&self, fingerprint: &str) -> bool {
        self.index.read().await.contains_key(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::fingerprint;
    use serde_json::json;
    use tempfile::TempDir;

    const DAY: u64 = 24 * 60 * 60;

    async fn write_entry(store: &DiskCacheStore, entry: &CacheEntry) {
        let path = store.entry_path(&entry.cache_key);
        fs::write(&path, serde_json::to_vec(entry).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        let key = fingerprint(b"image");
        let result = json!({"name": "cat", "tags": ["animal"], "confidence": 0.9});

        store.save(&key, &result).await.unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();

        assert_eq!(loaded.result, result);
        assert_eq!(loaded.cache_key, key);
        assert!(store.contains(&key).await);
        assert!(temp_dir.path().join(format!("{key}.json")).exists());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        let key = fingerprint(b"image");
        store.save(&key, &json!({"v": 1})).await.unwrap();
        store.save(&key, &json!({"v": 2})).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{key}.json")]);
        assert_eq!(store.load(&key).await.unwrap().unwrap().result, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_but_kept() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), 60).await.unwrap();
        let mut entry = CacheEntry::new(fingerprint(b"old"), json!({"name": "old"}));
        entry.timestamp -= 60.0 + 1.0;
        write_entry(&store, &entry).await;

        assert!(store.load(&entry.cache_key).await.unwrap().is_none());
        assert!(store.entry_path(&entry.cache_key).exists());
        assert!(store.read_entry(&entry.cache_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_miss_and_left_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let key = fingerprint(b"broken");
        let path = temp_dir.path().join(format!("{key}.json"));
        std::fs::write(&path, b"{not json").unwrap();

        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        assert!(!store.contains(&key).await);
        assert!(store.load(&key).await.unwrap().is_none());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_rebuild_skips_mismatched_and_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let good = CacheEntry::new(fingerprint(b"good"), json!({}));
        let liar = CacheEntry::new(fingerprint(b"liar"), json!({}));
        std::fs::write(
            temp_dir.path().join(format!("{}.json", good.cache_key)),
            serde_json::to_vec(&good).unwrap(),
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join(format!("{}.json", fingerprint(b"other"))),
            serde_json::to_vec(&liar).unwrap(),
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"hello").unwrap();

        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.contains(&good.cache_key).await);
    }

    #[tokio::test]
    async fn test_sweep_with_zero_max_age_deletes_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), 0).await.unwrap();
        let key = fingerprint(b"image");
        store.save(&key, &json!({"name": "cat"})).await.unwrap();
        assert_eq!(store.len().await, 1);

        let report = store.sweep(0).await.unwrap();
        assert_eq!(report.deleted, vec![key.clone()]);
        assert_eq!(store.len().await, 0);
        assert!(!store.entry_path(&key).exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        let key = fingerprint(b"fresh");
        store.save(&key, &json!({})).await.unwrap();

        let report = store.sweep(DAY).await.unwrap();
        assert_eq!(report.inspected, 1);
        assert_eq!(report.deleted_count(), 0);
        assert!(store.contains(&key).await);
    }

    #[tokio::test]
    async fn test_sweep_confirms_stored_timestamp() {
        // Old file time but a fresh stored timestamp: not expired.
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), 1).await.unwrap();
        let key = fingerprint(b"touched");
        store.save(&key, &json!({})).await.unwrap();

        let mut entry = store.read_entry(&key).await.unwrap().unwrap();
        entry.timestamp += 3600.0;
        write_entry(&store, &entry).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let report = store.sweep(1).await.unwrap();
        assert_eq!(report.deleted_count(), 0);
        assert!(store.entry_path(&key).exists());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_files_deleted_behind_its_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), 0).await.unwrap();
        let key = fingerprint(b"gone");
        store.save(&key, &json!({})).await.unwrap();
        std::fs::remove_file(store.entry_path(&key)).unwrap();

        let report = store.sweep(0).await.unwrap();
        assert_eq!(report.failures, 0);
        assert_eq!(report.deleted_count(), 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_remove_if_expired_rechecks_rewritten_document() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), 60).await.unwrap();
        let mut stale = CacheEntry::new(fingerprint(b"image"), json!({"v": 1}));
        stale.timestamp -= 120.0;
        write_entry(&store, &stale).await;

        // Rewritten after the sweep picked it as a candidate
        store.save(&stale.cache_key, &json!({"v": 2})).await.unwrap();

        assert!(!store.remove_if_expired(&stale.cache_key, 60).await.unwrap());
        assert!(store.contains(&stale.cache_key).await);
        let loaded = store.load(&stale.cache_key).await.unwrap().unwrap();
        assert_eq!(loaded.result, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_remove_if_expired_deletes_stale_document() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), 60).await.unwrap();
        let mut stale = CacheEntry::new(fingerprint(b"image"), json!({}));
        stale.timestamp -= 120.0;
        write_entry(&store, &stale).await;

        assert!(store.remove_if_expired(&stale.cache_key, 60).await.unwrap());
        assert!(!store.entry_path(&stale.cache_key).exists());
        assert!(!store.contains(&stale.cache_key).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweep_never_loses_fresh_saves() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(
            DiskCacheStore::open(temp_dir.path(), 60).await.unwrap(),
        );
        let keys: Vec<String> = (0..32u8).map(|i| fingerprint(&[i])).collect();

        // Seed every key with an expired document so the sweep targets all of them
        for key in &keys {
            let mut stale = CacheEntry::new(key.clone(), json!({"v": "old"}));
            stale.timestamp -= 120.0;
            write_entry(&store, &stale).await;
            std::fs::File::options()
                .write(true)
                .open(store.entry_path(key))
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(3600))
                .unwrap();
        }
        store.rebuild_index().await.unwrap();

        let sweeper = {
            let store = store.clone();
            tokio::spawn(async move { store.sweep(60).await.unwrap() })
        };
        let writers: Vec<_> = keys
            .iter()
            .cloned()
            .map(|key| {
                let store = store.clone();
                tokio::spawn(async move { store.save(&key, &json!({"v": "new"})).await.unwrap() })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        sweeper.await.unwrap();

        for key in &keys {
            assert!(store.contains(key).await);
            let loaded = store.load(key).await.unwrap().unwrap();
            assert_eq!(loaded.result, json!({"v": "new"}));
        }
    }

    #[tokio::test]
    async fn test_failed_rename_cleans_up_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        let key = fingerprint(b"blocked");
        let blocker = store.entry_path(&key);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("occupant"), b"x").unwrap();

        assert!(store.save(&key, &json!({})).await.is_err());
        assert!(!store.contains(&key).await);
        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(temp_dir.path(), DAY).await.unwrap();
        assert!(!store.remove(&fingerprint(b"never")).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_fails_when_dir_cannot_be_created() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let result = DiskCacheStore::open(blocker.join("cache"), DAY).await;
        assert!(result.is_err());
    }
}
