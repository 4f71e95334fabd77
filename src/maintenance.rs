//! Out-of-band cache and upload maintenance
//!
//! Runs the expiry sweep and the low-confidence upload prune. Both are
//! invoked from the CLI (or once at startup) and take the same locks as
//! the request path, so they are safe to run against a live server's
//! directories.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheCoordinator, SweepReport};
use crate::errors::StorageResult;
use crate::uploads::{PruneReport, UploadStore};

/// Maintenance runner over the cache and optional upload store
pub struct MaintenanceService {
    cache: Arc<CacheCoordinator>,
    uploads: Option<Arc<UploadStore>>,
}

impl MaintenanceService {
    pub fn new(cache: Arc<CacheCoordinator>, uploads: Option<Arc<UploadStore>>) -> Self {
        Self { cache, uploads }
    }

    /// Delete cache entries older than the configured max-age
    pub async fn sweep_expired_cache(&self) -> StorageResult<SweepReport> {
        let max_age = self.cache.disk().max_age();
        let report = self.cache.sweep(max_age).await?;

        let stats = self.cache.stats().await;
        info!(
            "Cache maintenance completed: deleted={} failures={} remaining_disk={} remaining_memory={} duration={}ms",
            report.deleted_count(),
            report.failures,
            stats.disk_cache_count,
            stats.memory_cache_count,
            report.duration_ms
        );
        Ok(report)
    }

    /// Prune retained uploads whose cached confidence is below `threshold`
    pub async fn prune_low_confidence_uploads(&self, threshold: f64, dry_run: bool) -> PruneReport {
        let Some(uploads) = &self.uploads else {
            warn!("Upload retention is disabled, nothing to prune");
            return PruneReport {
                dry_run,
                ..PruneReport::default()
            };
        };
        uploads
            .prune_low_confidence(&self.cache, threshold, dry_run)
            .await
    }
}
