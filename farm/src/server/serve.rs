//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::FarmError;
use crate::server::handlers::{
    devices_handler, health_handler, key_handler, play_handler, power_handler, refresh_handler,
    runs_handler, stop_device_handler, stop_group_handler, swipe_handler, tap_handler,
    version_handler,
};
use crate::server::state::ServerState;

/// Build the control API routes
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Devices
        .route("/devices", get(devices_handler))
        .route("/devices/refresh", post(refresh_handler))
        .route("/devices/{id}/stop", post(stop_device_handler))
        // Group actions
        .route("/groups/{id}/tap", post(tap_handler))
        .route("/groups/{id}/swipe", post(swipe_handler))
        .route("/groups/{id}/key", post(key_handler))
        .route("/groups/{id}/power/{action}", post(power_handler))
        // Macros
        .route("/groups/{id}/macros/{macro_id}/play", post(play_handler))
        .route("/groups/{id}/stop", post(stop_group_handler))
        .route("/runs", get(runs_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), FarmError>>, FarmError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| FarmError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| FarmError::ServerError(e.to_string()))
    });

    Ok(handle)
}
