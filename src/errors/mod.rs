//! Centralized error handling for the image analysis server
//!
//! Errors are grouped by the layer that produces them so that each layer
//! can decide locally whether a failure is recoverable.
//!
//! # Error Categories
//!
//! - **Storage Errors**: cache and upload directory I/O, JSON documents,
//!   index corruption (a cache miss, never fatal on the request path)
//! - **Backend Errors**: failures or timeouts of the vision model call
//! - **Web Errors**: request validation at the HTTP boundary
//!
//! # Usage
//!
//! ```rust
//! use aimglyze::errors::{StorageError, StorageResult};
//!
//! fn example_function(path: &str) -> StorageResult<String> {
//!     std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for cache and upload storage Results
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience type alias for analyzer backend Results
pub type BackendResult<T> = Result<T, BackendError>;
