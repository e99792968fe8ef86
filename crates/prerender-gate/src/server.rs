//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prerender_gate::{prerender, Prerender};
use tower_http::trace::TraceLayer;

use crate::origin::{handle_origin, OriginState};

/// Shared application state.
pub struct AppState {
    pub listen_address: String,
    pub gate: Arc<Prerender>,
    pub origin: OriginState,
}

/// Build the router: gate endpoints, then every other path through the
/// render gate to the origin.
pub fn router(state: AppState) -> Router {
    let site = Router::new()
        .fallback(handle_origin)
        .layer(axum::middleware::from_fn_with_state(
            state.gate.clone(),
            prerender,
        ))
        .with_state(state.origin);

    Router::new()
        .route("/_prerender/health", get(handle_health))
        .route("/_prerender/stats", get(handle_stats))
        .with_state(state.gate)
        .fallback_service(site)
        .layer(TraceLayer::new_for_http())
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "prerender-gate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("prerender-gate shut down gracefully");
    Ok(())
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Render counters as JSON.
async fn handle_stats(State(gate): State<Arc<Prerender>>) -> impl IntoResponse {
    Json(gate.stats().snapshot())
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
