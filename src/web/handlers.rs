//! Request handlers for the `/api` routes

use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
    },
    http::StatusCode,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::AppState;
use super::responses::{
    AnalyzeResponse, ApiError, CachedResultResponse, FileInfo, HealthCacheStats, HealthResponse,
    PublicConfig,
};
use super::upload::read_single_file;
use crate::cache::{fingerprint, is_fingerprint};
use crate::errors::WebError;
use crate::utils::time::{now_secs, system_time_to_secs};

/// Leading bytes of an upload shown in debug logs
const DEBUG_PREVIEW_BYTES: usize = 16;

/// `POST /api/analyze`
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let upload = read_single_file(multipart, &state.config.server).await?;
    let hash = fingerprint(&upload.bytes);

    if state.config.server.debug {
        let preview = &upload.bytes[..upload.bytes.len().min(DEBUG_PREVIEW_BYTES)];
        debug!(
            "Upload {:?}: {} bytes, {}, leading bytes {:02x?}",
            upload.file_name,
            upload.bytes.len(),
            upload.mime_type,
            preview
        );
    }

    let saved_path = match &state.uploads {
        Some(uploads) => match uploads
            .save(
                &hash,
                &upload.bytes,
                &upload.mime_type,
                upload.extension.as_deref(),
            )
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to retain upload {}: {}", hash, e);
                None
            }
        },
        None => None,
    };

    let resolution = state
        .coordinator
        .resolve(&hash, &upload.bytes, &upload.mime_type)
        .await?;
    info!("Resolved {} from {:?}", hash, resolution.tier);
    if state.config.server.debug {
        debug!("Result for {}: {}", hash, resolution.result);
    }

    let file_info = FileInfo {
        hash,
        path: saved_path
            .as_deref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned()),
        size: upload.bytes.len(),
        mime_type: upload.mime_type,
        saved: saved_path.is_some(),
    };
    Ok(Json(AnalyzeResponse {
        result: resolution.result,
        cache_key: resolution.cache_key,
        file_info,
    }))
}

/// `GET /api/results/{fingerprint}`
pub async fn get_result(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CachedResultResponse>, ApiError> {
    if !is_fingerprint(&key) {
        return Err(WebError::not_found("Result not found").into());
    }
    let entry = state
        .coordinator
        .cached(&key)
        .await
        .ok_or_else(|| WebError::not_found("Result not found"))?;
    Ok(Json(CachedResultResponse {
        result: entry.result,
        timestamp: entry.timestamp,
        cache_key: entry.cache_key,
    }))
}

/// `GET /api/config`
pub async fn get_config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(PublicConfig::from(state.config.as_ref()))
}

/// `GET /api/sample`
pub async fn get_sample(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = &state.config.server.sample_file;
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WebError::not_found("Sample data file not found").into());
        }
        Err(e) => {
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load sample data: {e}"),
            ));
        }
    };

    let mut sample: Value = serde_json::from_slice(&contents).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load sample data: {e}"),
        )
    })?;
    let Some(object) = sample.as_object_mut() else {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load sample data: not a JSON object",
        ));
    };

    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(system_time_to_secs)
        .unwrap_or_else(|_| now_secs());
    object.insert("is_sample".to_string(), Value::Bool(true));
    object.insert("timestamp".to_string(), Value::from(modified));
    Ok(Json(sample))
}

/// `GET /api/health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let upload_files_count = match &state.uploads {
        Some(uploads) => uploads.len().await,
        None => 0,
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: now_secs(),
        cache_stats: HealthCacheStats::new(state.coordinator.stats().await, upload_files_count),
    })
}
