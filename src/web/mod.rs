//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::dashboard::Dashboard;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub dashboard: Arc<Dashboard>,
}

/// Web server for the dashboard.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, dashboard: Arc<Dashboard>) -> Self {
        Self {
            state: AppState { config, dashboard },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            // Dashboard
            .route("/", get(handlers::handle_index))
            // API endpoints
            .route("/api/services", get(handlers::handle_services))
            .route("/api/start", post(handlers::handle_start))
            .route("/api/stop", post(handlers::handle_stop))
            .route("/api/start_all", post(handlers::handle_start_all))
            .route("/api/stop_all", post(handlers::handle_stop_all))
            .route("/api/job/{id}", get(handlers::handle_job))
            .route("/api/jobs", get(handlers::handle_jobs))
            // Static assets
            .route("/images/{*path}", get(handlers::handle_image))
            .route("/favicon.ico", get(handlers::handle_favicon))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
