//! Utility functions for the image analysis server
//!
//! - `utils::time` for epoch-seconds timestamps as stored in cache documents

pub mod time;
