//! Content-addressed analysis result cache
//!
//! Results are keyed by the SHA-256 fingerprint of the raw image bytes and
//! kept in two tiers:
//!
//! - **Memory**: LRU overlay with lazy expiry, lost on restart
//! - **Disk**: one JSON document per fingerprint, authoritative
//!
//! The [`CacheCoordinator`] resolves requests memory → disk → backend and
//! writes through disk first, then memory.

pub mod coordinator;
pub mod disk;
pub mod entry;
pub mod fingerprint;
pub mod memory;

pub use coordinator::{CacheCoordinator, CacheStats, CacheTier, Resolution};
pub use disk::{DiskCacheStore, IndexedFile, SweepReport};
pub use entry::CacheEntry;
pub use fingerprint::{fingerprint, is_fingerprint};
pub use memory::MemoryCacheStore;
