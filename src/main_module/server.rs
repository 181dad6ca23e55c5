//! HTTP server initialization

use axum::Router;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api_router::configure_routes;
use crate::core::cors::create_cors_layer;
use crate::core::shared::state::AppState;

use super::shutdown_signal;

/// The complete application: every route plus the CORS layer, state applied.
pub fn build_app(app_state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(&app_state.config.server);
    configure_routes(&app_state.config)
        .with_state(app_state)
        .layer(cors)
}

pub async fn run_axum_server(app_state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = build_app(app_state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(std::io::Error::other)
}
