//! Favicon with a built-in fallback

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use tokio::fs;
use tracing::warn;

use super::AppState;

/// 16x16 icon served when the frontend root has no `favicon.ico`
pub const DEFAULT_FAVICON: &[u8] = include_bytes!("../../assets/favicon.ico");

/// Serve the favicon, preferring the frontend root's copy
pub async fn serve_favicon(State(state): State<AppState>) -> impl IntoResponse {
    let path = state.config.server.frontend_root.join("favicon.ico");
    let data = match fs::read(&path).await {
        Ok(data) => data,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            DEFAULT_FAVICON.to_vec()
        }
    };

    (
        [
            (header::CONTENT_TYPE, "image/x-icon"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        data,
    )
}
