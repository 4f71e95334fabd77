//! HTTP response types and utilities
//!
//! Successful endpoints return plain JSON documents; every failure uses
//! the `{error: true, code, message}` envelope with a matching status.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::cache::CacheStats;
use crate::config::{Config, FrontendConfig};
use crate::errors::{BackendError, StorageError, WebError};

/// Error envelope shared by all endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: bool,
    pub code: u16,
    pub message: String,
}

/// Error returned from handlers, rendered as an [`ErrorEnvelope`]
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: true,
            code: self.status.as_u16(),
            message: self.message,
        };
        (self.status, Json(envelope)).into_response()
    }
}

impl From<WebError> for ApiError {
    fn from(error: WebError) -> Self {
        Self::new(error.status_code(), error.to_string())
    }
}

impl From<BackendError> for ApiError {
    fn from(error: BackendError) -> Self {
        warn!("Analysis failed: {}", error);
        Self::new(error.status_code(), error.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        error!("Storage failure: {}", error);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

/// Metadata about the uploaded file attached to an analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub hash: String,
    /// Basename of the retained upload
    pub path: Option<String>,
    pub size: usize,
    pub mime_type: String,
    pub saved: bool,
}

/// Body of a successful `POST /api/analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub result: Value,
    pub cache_key: String,
    pub file_info: FileInfo,
}

/// Body of `GET /api/results/{fingerprint}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResultResponse {
    pub result: Value,
    pub timestamp: f64,
    pub cache_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCacheStats {
    pub memory_cache_count: usize,
    pub disk_cache_count: usize,
    pub upload_files_count: usize,
}

impl HealthCacheStats {
    pub fn new(stats: CacheStats, upload_files_count: usize) -> Self {
        Self {
            memory_cache_count: stats.memory_cache_count,
            disk_cache_count: stats.disk_cache_count,
            upload_files_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: f64,
    pub cache_stats: HealthCacheStats,
}

/// Public subset of the configuration exposed to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicConfig {
    pub frontend: FrontendConfig,
    pub allowed_extensions: Vec<String>,
    pub max_upload_size: u64,
    pub save_upload: bool,
    pub cache_max_age: u64,
}

impl From<&Config> for PublicConfig {
    fn from(config: &Config) -> Self {
        Self {
            frontend: config.frontend.clone(),
            allowed_extensions: config.server.allowed_extensions.clone(),
            max_upload_size: config.server.max_upload_size,
            save_upload: config.server.save_upload,
            cache_max_age: config.cache.max_age,
        }
    }
}
