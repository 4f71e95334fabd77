//! HTTP middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::AppState;

/// Path polled by monitoring, logged only in debug mode
const HEALTH_PATH: &str = "/api/health";

/// Request logging middleware
///
/// Logs every request with a generated request id and timing.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let quiet = uri.path() == HEALTH_PATH && !state.config.server.debug;

    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    if !quiet {
        debug!(
            method = %method,
            uri = %uri,
            request_id = %request_id,
            "HTTP request started"
        );
    }

    let response = next.run(request).await;
    if quiet {
        return response;
    }

    let status = response.status().as_u16();
    let duration = start.elapsed();
    if status >= 400 {
        warn!(
            method = %method,
            uri = %uri,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            "HTTP request completed with error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    response
}
