//! HTTP front end for the generation service.
//!
//! | route | |
//! |---|---|
//! | `GET /health` | liveness plus the active provider |
//! | `POST /api/message` | one-shot generation, JSON response |
//! | `POST /api/stream` | streaming generation as server-sent events |

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::DONE_SENTINEL;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use nabokov_provider::GenerationService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body.
pub const BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared handler state.
pub struct AppState {
    pub service: Arc<GenerationService>,
}

impl AppState {
    pub fn new(service: Arc<GenerationService>) -> Self {
        Self { service }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/message", post(handlers::message))
        .route("/api/stream", post(handlers::stream))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let provider = state.service.provider_name().to_string();
    let key = state.service.provider_key().to_string();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, provider = %provider, key = %key, "nabokov server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("nabokov server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
