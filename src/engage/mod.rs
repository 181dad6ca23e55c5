pub mod data;

use axum::Router;
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub fn configure_engage_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new().merge(data::configure_data_routes(max_upload_bytes))
}
