//! Content-addressed storage for raw uploads
//!
//! Each retained upload is stored once as `{fingerprint}{ext}`. The index
//! is rebuilt at startup by re-hashing every file, so a file whose bytes no
//! longer match its name never enters the index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheCoordinator, fingerprint, is_fingerprint};
use crate::config::defaults::DEFAULT_UPLOAD_EXTENSION;
use crate::config::normalize_extension;
use crate::errors::{StorageError, StorageResult};

pub mod mime;

pub use mime::{extension_for_mime, mime_for_extension};

/// Outcome of an upload index rebuild
#[derive(Debug, Default)]
pub struct RebuildReport {
    pub indexed: usize,
    /// Files whose bytes do not hash to their name
    pub mismatched: Vec<PathBuf>,
    /// Files skipped for extension or naming
    pub ignored: usize,
}

/// Outcome of a low-confidence prune
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Uploads looked at
    pub inspected: usize,
    /// Fingerprints removed, or that would be removed on a dry run
    pub affected: Vec<String>,
    pub failures: usize,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl PruneReport {
    pub fn affected_count(&self) -> usize {
        self.affected.len()
    }
}

/// Upload directory with a fingerprint → path index
pub struct UploadStore {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
    index: RwLock<HashMap<String, PathBuf>>,
}

impl UploadStore {
    /// Create the upload directory if needed and rebuild the index.
    ///
    /// Failing to create the directory is fatal for the caller.
    pub async fn open(
        dir: impl Into<PathBuf>,
        allowed_extensions: &[String],
    ) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let store = Self {
            dir,
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            index: RwLock::new(HashMap::new()),
        };
        store.rebuild().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty()
            || self
                .allowed_extensions
                .iter()
                .any(|allowed| *allowed == normalize_extension(extension))
    }

    /// Scan the upload directory, re-hash each candidate and replace the index
    pub async fn rebuild(&self) -> StorageResult<RebuildReport> {
        info!("Scanning upload directory {}", self.dir.display());
        let start_time = std::time::Instant::now();
        let mut report = RebuildReport::default();
        let mut rebuilt = HashMap::new();

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;
        while let Some(dir_entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let path = dir_entry.path();
            let (Some(stem), Some(extension)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|e| e.to_str()),
            ) else {
                report.ignored += 1;
                continue;
            };
            if !self.is_allowed(extension) || !is_fingerprint(stem) {
                debug!("Ignoring upload directory entry {}", path.display());
                report.ignored += 1;
                continue;
            }

            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read upload {}: {}", path.display(), e);
                    report.ignored += 1;
                    continue;
                }
            };
            if fingerprint(&bytes) != stem {
                warn!(
                    "Upload {} does not match its content hash, excluded from index",
                    path.display()
                );
                report.mismatched.push(path);
                continue;
            }
            rebuilt.insert(stem.to_string(), path);
        }

        report.indexed = rebuilt.len();
        *self.index.write().await = rebuilt;
        info!(
            "Upload scan completed: {} indexed, {} mismatched, {} ignored in {:.2}s",
            report.indexed,
            report.mismatched.len(),
            report.ignored,
            start_time.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    /// Path of the stored upload for `fingerprint`
    pub async fn has(&self, fingerprint: &str) -> Option<PathBuf> {
        self.index.read().await.get(fingerprint).cloned()
    }

    /// Extension for a new upload, always one that [`Self::rebuild`] accepts.
    ///
    /// Preference: the MIME type's extension, then the client's filename
    /// extension, then the default, then the first allowed extension.
    fn storage_extension(&self, mime_type: &str, extension_hint: Option<&str>) -> String {
        extension_for_mime(mime_type)
            .map(str::to_string)
            .into_iter()
            .chain(extension_hint.map(normalize_extension))
            .chain(std::iter::once(DEFAULT_UPLOAD_EXTENSION.to_string()))
            .find(|ext| ext.len() > 1 && self.is_allowed(ext))
            .or_else(|| self.allowed_extensions.first().cloned())
            .unwrap_or_else(|| DEFAULT_UPLOAD_EXTENSION.to_string())
    }

    /// Store `bytes` under `fingerprint` unless already present.
    ///
    /// `extension_hint` is the extension the client declared, used when the
    /// MIME type maps to an extension outside the allow-list. Returns the
    /// stored path either way.
    pub async fn save(
        &self,
        fingerprint: &str,
        bytes: &[u8],
        mime_type: &str,
        extension_hint: Option<&str>,
    ) -> StorageResult<PathBuf> {
        let mut index = self.index.write().await;
        if let Some(existing) = index.get(fingerprint) {
            debug!("Upload already stored: {}", existing.display());
            return Ok(existing.clone());
        }

        let extension = self.storage_extension(mime_type, extension_hint);
        let file_path = self.dir.join(format!("{fingerprint}{extension}"));
        let temp_path = self
            .dir
            .join(format!("{}.{}.tmp", fingerprint, uuid::Uuid::new_v4()));

        fs::write(&temp_path, bytes)
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
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

        info!("Saved upload {} ({} bytes)", file_path.display(), bytes.len());
        index.insert(fingerprint.to_string(), file_path.clone());
        Ok(file_path)
    }

    /// Delete the stored upload and its index record.
    ///
    /// A file that is already gone is not an error.
    pub async fn remove(&self, fingerprint: &str) -> StorageResult<bool> {
        let mut index = self.index.write().await;
        let Some(path) = index.get(fingerprint).cloned() else {
            return Ok(false);
        };
        let removed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        index.remove(fingerprint);
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Remove uploads whose cached result has a confidence below `threshold`.
    ///
    /// The upload goes first and the cache entry second; failing to delete
    /// the cache entry is logged and does not undo the upload removal. With
    /// `dry_run` nothing is deleted and the report lists what would be.
    pub async fn prune_low_confidence(
        &self,
        cache: &CacheCoordinator,
        threshold: f64,
        dry_run: bool,
    ) -> PruneReport {
        info!(
            "Pruning uploads with confidence below {} (dry run: {})",
            threshold, dry_run
        );
        let start_time = std::time::Instant::now();
        let mut report = PruneReport {
            dry_run,
            ..PruneReport::default()
        };

        let mut candidates: Vec<String> = self.index.read().await.keys().cloned().collect();
        candidates.sort();

        for key in candidates {
            report.inspected += 1;
            let entry = match cache.disk().read_entry(&key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    debug!("No cache entry for upload {}", key);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to read cache entry for upload {}: {}", key, e);
                    report.failures += 1;
                    continue;
                }
            };

            let confidence = entry.confidence();
            if confidence >= threshold {
                continue;
            }
            if dry_run {
                info!("Would remove {} (confidence {:.2})", key, confidence);
                report.affected.push(key);
                continue;
            }

            match self.remove(&key).await {
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to remove upload {}: {}", key, e);
                    report.failures += 1;
                    continue;
                }
            }
            if let Err(e) = cache.evict(&key).await {
                warn!("Removed upload {} but not its cache entry: {}", key, e);
            }
            info!("Removed {} (confidence {:.2})", key, confidence);
            report.affected.push(key);
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Prune completed: {} of {} uploads {} ({} failures) in {}ms",
            report.affected_count(),
            report.inspected,
            if dry_run { "matched" } else { "removed" },
            report.failures,
            report.duration_ms
        );
        report
    }
}
