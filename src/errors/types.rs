//! Error type definitions for the image analysis server
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that keeps the cache an
//! optimization rather than a dependency of the request path.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Cache and upload storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failures
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache document serialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored document or file does not match what its name promises
    #[error("Index corruption in {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Vision backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport or HTTP status failures
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned by the provider
    #[error("Provider {provider} returned {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    /// The call exceeded the configured timeout
    #[error("Analysis timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The provider answered with something that is not a JSON object
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// The API key environment variable is not set
    #[error("Missing API key: environment variable {env_var} is not set")]
    MissingApiKey { env_var: String },

    /// Unknown provider name in configuration
    #[error("Unknown analyzer provider: {0}")]
    UnknownProvider(String),
}

/// Web layer validation errors
#[derive(Error, Debug)]
pub enum WebError {
    /// Malformed request body or missing file part
    #[error("{message}")]
    BadRequest { message: String },

    /// File extension is not on the allow-list
    #[error("File type not allowed: {extension} (allowed: {allowed})")]
    ExtensionNotAllowed { extension: String, allowed: String },

    /// Upload exceeds the configured maximum
    #[error("File too large (max {max_mb}MB)")]
    PayloadTooLarge { size: Option<usize>, max_mb: u64 },

    /// No cached result or fixture for the request
    #[error("{message}")]
    NotFound { message: String },
}

impl StorageError {
    /// Wrap an I/O error together with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a corruption error for a path
    pub fn corrupt<S: Into<String>>(path: impl Into<PathBuf>, message: S) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl BackendError {
    /// Create an invalid response error
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// HTTP status surfaced to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl WebError {
    /// Create a bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// HTTP status for this validation failure
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::ExtensionNotAllowed { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_error_status_codes() {
        assert_eq!(
            WebError::bad_request("No file uploaded").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebError::PayloadTooLarge {
                size: Some(11),
                max_mb: 10
            }
            .status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            WebError::ExtensionNotAllowed {
                extension: ".gif".to_string(),
                allowed: ".jpg".to_string()
            }
            .status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn test_backend_timeout_maps_to_gateway_timeout() {
        let err = BackendError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        let err = BackendError::invalid_response("not json");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
