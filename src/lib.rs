//! Image analysis server with a content-addressed result cache
//!
//! Uploaded images are fingerprinted by their bytes. Results from the
//! vision backend are cached in memory and on disk under that
//! fingerprint, and retained uploads are deduplicated by it.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod errors;
pub mod maintenance;
pub mod uploads;
pub mod utils;
pub mod web;
