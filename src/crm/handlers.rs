use axum::extract::State;
use std::sync::Arc;
use uuid::Uuid;

use super::service::CrmService;
use super::types::{
    AddContactToPipelineRequest, Automation, Board, Contact, ContactPlacement,
    CreateAutomationRequest, CreateContactRequest, CreateDealRequest, CreatePipelineRequest, Deal,
    DealFilter, MoveItemRequest, MoveRequest, MoveResult, Pipeline, ReorderStagesRequest, Stage,
    StageInput, UpdateAutomationRequest, UpdateContactRequest, UpdateDealRequest,
    UpdatePipelineRequest, UpdatePlacementRequest, UpdateStageRequest,
};
use crate::core::middleware::AuthenticatedUser;
use crate::core::shared::{
    ApiError, ApiResponse, ApiResult, AppState, JsonBody, PathParams, QueryParams,
};

fn service(state: &AppState) -> CrmService {
    CrmService::new(state.crm.clone())
}

// Pipelines

pub async fn list_pipelines(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<ApiResponse<Vec<Pipeline>>> {
    let pipelines = service(&state).list_pipelines(user.company_id).await?;
    Ok(ApiResponse::ok(pipelines))
}

pub async fn create_pipeline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonBody(req): JsonBody<CreatePipelineRequest>,
) -> ApiResult<ApiResponse<Pipeline>> {
    let pipeline = service(&state).create_pipeline(user.company_id, req).await?;
    Ok(ApiResponse::created(pipeline).with_message("Pipeline created successfully"))
}

pub async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Pipeline>> {
    let pipeline = service(&state).get_pipeline(user.company_id, id).await?;
    Ok(ApiResponse::ok(pipeline))
}

pub async fn update_pipeline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdatePipelineRequest>,
) -> ApiResult<ApiResponse<Pipeline>> {
    let pipeline = service(&state)
        .update_pipeline(user.company_id, id, req)
        .await?;
    Ok(ApiResponse::ok(pipeline).with_message("Pipeline updated successfully"))
}

pub async fn delete_pipeline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    service(&state).delete_pipeline(user.company_id, id).await?;
    Ok(ApiResponse::message("Pipeline deleted successfully"))
}

pub async fn get_board(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Board>> {
    let board = service(&state).get_board(user.company_id, id).await?;
    Ok(ApiResponse::ok(board))
}

// Stages

pub async fn list_stages(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Vec<Stage>>> {
    let stages = service(&state)
        .list_stages(user.company_id, pipeline_id)
        .await?;
    Ok(ApiResponse::ok(stages))
}

pub async fn add_stage(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<StageInput>,
) -> ApiResult<ApiResponse<Stage>> {
    let stage = service(&state)
        .add_stage(user.company_id, pipeline_id, req)
        .await?;
    Ok(ApiResponse::created(stage).with_message("Stage created successfully"))
}

pub async fn reorder_stages(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<ReorderStagesRequest>,
) -> ApiResult<ApiResponse<Vec<Stage>>> {
    let stages = service(&state)
        .reorder_stages(user.company_id, pipeline_id, req)
        .await?;
    Ok(ApiResponse::ok(stages).with_message("Stages reordered successfully"))
}

pub async fn update_stage(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdateStageRequest>,
) -> ApiResult<ApiResponse<Stage>> {
    let stage = service(&state).update_stage(user.company_id, id, req).await?;
    Ok(ApiResponse::ok(stage).with_message("Stage updated successfully"))
}

pub async fn delete_stage(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    service(&state).delete_stage(user.company_id, id).await?;
    Ok(ApiResponse::message("Stage deleted successfully"))
}

// Moves

/// Generic board move. The path pipeline wins when the body omits one and
/// must agree with it otherwise.
pub async fn move_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
    JsonBody(mut req): JsonBody<MoveItemRequest>,
) -> ApiResult<ApiResponse<MoveResult>> {
    match req.pipeline_id {
        Some(body_pipeline) if body_pipeline != pipeline_id => {
            return Err(ApiError::validation(
                "pipelineId",
                "Pipeline in body does not match the URL",
            ));
        }
        _ => req.pipeline_id = Some(pipeline_id),
    }
    let result = service(&state).move_item(user.company_id, req).await?;
    Ok(ApiResponse::ok(result).with_message("Item moved successfully"))
}

pub async fn move_deal(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<MoveRequest>,
) -> ApiResult<ApiResponse<MoveResult>> {
    let result = service(&state).move_deal(user.company_id, id, req).await?;
    Ok(ApiResponse::ok(result).with_message("Deal moved successfully"))
}

pub async fn move_contact(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams((pipeline_id, contact_id)): PathParams<(Uuid, Uuid)>,
    JsonBody(req): JsonBody<MoveRequest>,
) -> ApiResult<ApiResponse<MoveResult>> {
    let result = service(&state)
        .move_contact(user.company_id, pipeline_id, contact_id, req)
        .await?;
    Ok(ApiResponse::ok(result).with_message("Contact moved successfully"))
}

// Contact placements

pub async fn list_placements(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Vec<ContactPlacement>>> {
    let placements = service(&state)
        .list_placements(user.company_id, pipeline_id)
        .await?;
    Ok(ApiResponse::ok(placements))
}

pub async fn add_contact_to_pipeline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
    JsonBody(req): JsonBody<AddContactToPipelineRequest>,
) -> ApiResult<ApiResponse<ContactPlacement>> {
    let placement = service(&state)
        .add_contact_to_pipeline(user.company_id, pipeline_id, req)
        .await?;
    Ok(ApiResponse::created(placement).with_message("Contact added to pipeline"))
}

pub async fn update_placement(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams((pipeline_id, contact_id)): PathParams<(Uuid, Uuid)>,
    JsonBody(req): JsonBody<UpdatePlacementRequest>,
) -> ApiResult<ApiResponse<ContactPlacement>> {
    let placement = service(&state)
        .update_placement(user.company_id, pipeline_id, contact_id, req)
        .await?;
    Ok(ApiResponse::ok(placement))
}

pub async fn remove_contact_from_pipeline(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams((pipeline_id, contact_id)): PathParams<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<()>> {
    service(&state)
        .remove_contact_from_pipeline(user.company_id, pipeline_id, contact_id)
        .await?;
    Ok(ApiResponse::message("Contact removed from pipeline"))
}

// Contacts

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<ApiResponse<Vec<Contact>>> {
    let contacts = service(&state).list_contacts(user.company_id).await?;
    Ok(ApiResponse::ok(contacts))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonBody(req): JsonBody<CreateContactRequest>,
) -> ApiResult<ApiResponse<Contact>> {
    let contact = service(&state).create_contact(user.company_id, req).await?;
    Ok(ApiResponse::created(contact).with_message("Contact created successfully"))
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Contact>> {
    let contact = service(&state).get_contact(user.company_id, id).await?;
    Ok(ApiResponse::ok(contact))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdateContactRequest>,
) -> ApiResult<ApiResponse<Contact>> {
    let contact = service(&state)
        .update_contact(user.company_id, id, req)
        .await?;
    Ok(ApiResponse::ok(contact).with_message("Contact updated successfully"))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    service(&state).delete_contact(user.company_id, id).await?;
    Ok(ApiResponse::message("Contact deleted successfully"))
}

// Deals

pub async fn list_deals(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    QueryParams(filter): QueryParams<DealFilter>,
) -> ApiResult<ApiResponse<Vec<Deal>>> {
    let deals = service(&state).list_deals(user.company_id, filter).await?;
    Ok(ApiResponse::ok(deals))
}

pub async fn create_deal(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonBody(req): JsonBody<CreateDealRequest>,
) -> ApiResult<ApiResponse<Deal>> {
    let deal = service(&state).create_deal(user.company_id, req).await?;
    Ok(ApiResponse::created(deal).with_message("Deal created successfully"))
}

pub async fn get_deal(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Deal>> {
    let deal = service(&state).get_deal(user.company_id, id).await?;
    Ok(ApiResponse::ok(deal))
}

pub async fn update_deal(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdateDealRequest>,
) -> ApiResult<ApiResponse<Deal>> {
    let deal = service(&state).update_deal(user.company_id, id, req).await?;
    Ok(ApiResponse::ok(deal).with_message("Deal updated successfully"))
}

pub async fn delete_deal(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    service(&state).delete_deal(user.company_id, id).await?;
    Ok(ApiResponse::message("Deal deleted successfully"))
}

// Automations

pub async fn list_automations(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(pipeline_id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Vec<Automation>>> {
    let automations = service(&state)
        .list_automations(user.company_id, pipeline_id)
        .await?;
    Ok(ApiResponse::ok(automations))
}

pub async fn create_automation(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonBody(req): JsonBody<CreateAutomationRequest>,
) -> ApiResult<ApiResponse<Automation>> {
    let automation = service(&state)
        .create_automation(user.company_id, req)
        .await?;
    Ok(ApiResponse::created(automation).with_message("Automation created successfully"))
}

pub async fn get_automation(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Automation>> {
    let automation = service(&state).get_automation(user.company_id, id).await?;
    Ok(ApiResponse::ok(automation))
}

pub async fn update_automation(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdateAutomationRequest>,
) -> ApiResult<ApiResponse<Automation>> {
    let automation = service(&state)
        .update_automation(user.company_id, id, req)
        .await?;
    Ok(ApiResponse::ok(automation).with_message("Automation updated successfully"))
}

pub async fn delete_automation(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    service(&state).delete_automation(user.company_id, id).await?;
    Ok(ApiResponse::message("Automation deleted successfully"))
}
