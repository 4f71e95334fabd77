//! Web layer module
//!
//! HTTP interface of the analysis server. Handlers are thin: they validate
//! the request and delegate to the cache coordinator and upload store.
//!
//! # Components
//!
//! - **Handlers**: `/api` endpoints
//! - **Upload**: single-file multipart extraction and validation
//! - **Responses**: JSON bodies and the error envelope
//! - **Middleware**: request logging
//! - **Static assets**: favicon fallback

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info, warn};

use crate::{
    analyzer::Analyzer,
    cache::{CacheCoordinator, DiskCacheStore, MemoryCacheStore},
    config::Config,
    maintenance::MaintenanceService,
    uploads::UploadStore,
};

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod static_assets;
pub mod upload;

pub use responses::{ApiError, ErrorEnvelope};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: Arc<CacheCoordinator>,
    /// Present only when upload retention is enabled
    pub uploads: Option<Arc<UploadStore>>,
}

impl AppState {
    /// Open the cache and upload directories and wire up the coordinator.
    ///
    /// Failing to create either directory aborts startup.
    pub async fn initialize(config: Config, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let disk = DiskCacheStore::open(&config.cache.dir, config.cache.max_age)
            .await
            .with_context(|| {
                format!("Failed to open cache directory {}", config.cache.dir.display())
            })?;
        let memory = MemoryCacheStore::new(config.cache.memory_capacity, config.cache.max_age);
        info!(
            "Cache directory: {} (max age {:.1} days, memory capacity {})",
            config.cache.dir.display(),
            config.cache.max_age as f64 / 86_400.0,
            config.cache.memory_capacity
        );

        let coordinator = Arc::new(CacheCoordinator::new(
            memory,
            disk,
            analyzer,
            config.analyzer.timeout_duration()?,
            config.cache.single_flight,
        ));

        let uploads = if config.server.save_upload {
            let store = UploadStore::open(
                &config.server.upload_dir,
                &config.server.allowed_extensions,
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to open upload directory {}",
                    config.server.upload_dir.display()
                )
            })?;
            info!("Upload retention enabled: {}", config.server.upload_dir.display());
            Some(Arc::new(store))
        } else {
            None
        };

        if !config.server.frontend_root.is_dir() {
            warn!(
                "Frontend root {} does not exist, static files will not be served",
                config.server.frontend_root.display()
            );
        }

        let state = Self {
            config: Arc::new(config),
            coordinator,
            uploads,
        };

        if state.config.cache.cleanup_on_start {
            info!("Sweeping expired cache entries on startup");
            if let Err(e) = state.maintenance().sweep_expired_cache().await {
                warn!("Startup cache sweep failed: {}", e);
            }
        }
        Ok(state)
    }

    pub fn maintenance(&self) -> MaintenanceService {
        MaintenanceService::new(self.coordinator.clone(), self.uploads.clone())
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes();
    let frontend = ServeDir::new(&state.config.server.frontend_root);

    Router::new()
        .route(
            "/api/analyze",
            post(handlers::analyze).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/results/{fingerprint}", get(handlers::get_result))
        .route("/api/config", get(handlers::get_config))
        .route("/api/sample", get(handlers::get_sample))
        .route("/api/health", get(handlers::health_check))
        .route("/favicon.ico", get(static_assets::serve_favicon))
        // Static frontend, index.html for directories
        .fallback_service(frontend)
        // Middleware (applied in reverse order)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
            .parse()
            .context("Invalid listen address")?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", self.addr))?;
        info!("Listening on http://{}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Web server stopped");
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down gracefully");
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT (Ctrl+C), shutting down gracefully");
                    }
                }
            }
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down gracefully");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully");
    }
}
