//! Datasets of free-form records fed by hand, file import or webhook.

pub mod handlers;
pub mod import;
pub mod service;
pub mod types;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use service::DataService;

/// Slack on top of the file limit for multipart framing and form fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn configure_data_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    use handlers::*;

    Router::new()
        .route("/api/engage/data", get(list_datasets).post(create_dataset))
        .route(
            "/api/engage/data/import",
            post(import_data).layer(DefaultBodyLimit::max(
                max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
            )),
        )
        .route(
            "/api/engage/data/:id",
            get(get_dataset).put(update_dataset).delete(delete_dataset),
        )
        .route(
            "/api/engage/data/:id/regenerate-webhook-secret",
            post(regenerate_webhook_secret),
        )
        .route(
            "/api/engage/data/:id/records",
            get(list_records).post(add_record),
        )
        .route("/api/engage/data/webhook/:webhook_id", post(receive_webhook))
}
