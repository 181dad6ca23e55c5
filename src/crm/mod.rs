//! Pipelines, stages, deals and contact placements laid out as a board.

pub mod handlers;
pub mod ordering;
pub mod service;
pub mod types;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;

pub use service::CrmService;

pub fn configure_crm_routes() -> Router<Arc<AppState>> {
    use handlers::*;

    Router::new()
        .route("/api/crm/pipelines", get(list_pipelines).post(create_pipeline))
        .route(
            "/api/crm/pipelines/:id",
            get(get_pipeline).put(update_pipeline).delete(delete_pipeline),
        )
        .route("/api/crm/pipelines/:id/board", get(get_board))
        .route("/api/crm/pipelines/:id/stages", get(list_stages).post(add_stage))
        .route("/api/crm/pipelines/:id/stages/reorder", put(reorder_stages))
        .route("/api/crm/pipelines/:id/move", put(move_item))
        .route(
            "/api/crm/pipelines/:id/contacts",
            get(list_placements).post(add_contact_to_pipeline),
        )
        .route(
            "/api/crm/pipelines/:id/contacts/:contact_id",
            put(update_placement).delete(remove_contact_from_pipeline),
        )
        .route(
            "/api/crm/pipelines/:id/contacts/:contact_id/move",
            put(move_contact),
        )
        .route("/api/crm/pipelines/:id/automations", get(list_automations))
        .route("/api/crm/stages/:id", put(update_stage).delete(delete_stage))
        .route("/api/crm/deals", get(list_deals).post(create_deal))
        .route(
            "/api/crm/deals/:id",
            get(get_deal).put(update_deal).delete(delete_deal),
        )
        .route("/api/crm/deals/:id/move", put(move_deal))
        .route("/api/crm/contacts", get(list_contacts).post(create_contact))
        .route(
            "/api/crm/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route("/api/crm/automations", post(create_automation))
        .route(
            "/api/crm/automations/:id",
            get(get_automation)
                .put(update_automation)
                .delete(delete_automation),
        )
}
