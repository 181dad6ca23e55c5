//! API Router
//!
//! Combines the CRM and engage endpoints with the health probe into one router.

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::crm::configure_crm_routes;
use crate::engage::configure_engage_routes;
use crate::main_module::health_check;

/// Configure all routes; state is applied by the caller.
pub fn configure_routes(config: &AppConfig) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(configure_crm_routes())
        .merge(configure_engage_routes(config.import.max_upload_bytes))
}
