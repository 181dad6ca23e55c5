use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::ordering::{self, OrderingError};
use super::types::{
    AddContactToPipelineRequest, Automation, Board, BoardColumn, Contact, ContactPlacement,
    CreateAutomationRequest, CreateContactRequest, CreateDealRequest, CreatePipelineRequest, Deal,
    DealFilter, ItemType, MoveItemRequest, MoveRequest, MoveResult, Pipeline,
    ReorderStagesRequest, Stage, StageInput, UpdateAutomationRequest, UpdateContactRequest,
    UpdateDealRequest, UpdatePipelineRequest, UpdatePlacementRequest, UpdateStageRequest,
};
use crate::core::shared::error::{ApiError, ApiResult, FieldError};
use crate::store::{
    CrmStore, MoveCommand, MoveTarget, NewAutomation, NewContact, NewDeal, NewPipeline,
    NewPlacement, NewStage,
};

/// Stages seeded into a pipeline created without an explicit list.
pub const DEFAULT_STAGES: [(&str, &str); 6] = [
    ("Qualified Lead", "#e3f2fd"),
    ("Initial Contact", "#bbdefb"),
    ("Meeting Scheduled", "#90caf9"),
    ("Proposal Sent", "#64b5f6"),
    ("Negotiation", "#42a5f5"),
    ("Closed Won", "#2196f3"),
];

pub const DEFAULT_STAGE_COLOR: &str = "#e3f2fd";

fn required(value: &str, field: &str, label: &str) -> Result<String, FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(field, &format!("{label} is required")));
    }
    Ok(trimmed.to_string())
}

fn check_amount(amount: f64, field: &str, errors: &mut Vec<FieldError>) {
    if !amount.is_finite() || amount < 0.0 {
        errors.push(FieldError::new(field, "Amount must be a non-negative number"));
    }
}

fn check_probability(probability: i32, errors: &mut Vec<FieldError>) {
    if !(0..=100).contains(&probability) {
        errors.push(FieldError::new(
            "probability",
            "Probability must be between 0 and 100",
        ));
    }
}

fn into_result(errors: Vec<FieldError>) -> ApiResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn stage_input(input: &StageInput, field: &str) -> Result<NewStage, FieldError> {
    Ok(NewStage {
        name: required(&input.name, field, "Stage name")?,
        color: input
            .color
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_STAGE_COLOR)
            .to_string(),
    })
}

pub struct CrmService {
    store: Arc<dyn CrmStore>,
}

impl CrmService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    // Ownership checks. Missing rows are 404, other tenants' rows are 403.

    async fn owned_pipeline(&self, company_id: Uuid, id: Uuid) -> ApiResult<Pipeline> {
        let pipeline = self
            .store
            .get_pipeline(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Pipeline"))?;
        if pipeline.company_id != company_id {
            warn!("Company {company_id} denied access to pipeline {id}");
            return Err(ApiError::access_denied());
        }
        Ok(pipeline)
    }

    async fn owned_stage(&self, company_id: Uuid, id: Uuid) -> ApiResult<Stage> {
        let stage = self
            .store
            .get_stage(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Stage"))?;
        self.owned_pipeline(company_id, stage.pipeline_id).await?;
        Ok(stage)
    }

    async fn owned_contact(&self, company_id: Uuid, id: Uuid) -> ApiResult<Contact> {
        let contact = self
            .store
            .get_contact(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Contact"))?;
        if contact.company_id != company_id {
            warn!("Company {company_id} denied access to contact {id}");
            return Err(ApiError::access_denied());
        }
        Ok(contact)
    }

    async fn owned_deal(&self, company_id: Uuid, id: Uuid) -> ApiResult<Deal> {
        let deal = self
            .store
            .get_deal(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Deal"))?;
        if deal.company_id != company_id {
            warn!("Company {company_id} denied access to deal {id}");
            return Err(ApiError::access_denied());
        }
        Ok(deal)
    }

    async fn owned_automation(&self, company_id: Uuid, id: Uuid) -> ApiResult<Automation> {
        let automation = self
            .store
            .get_automation(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Automation"))?;
        self.owned_pipeline(company_id, automation.pipeline_id)
            .await?;
        Ok(automation)
    }

    async fn owned_placement(
        &self,
        company_id: Uuid,
        pipeline_id: Uuid,
        contact_id: Uuid,
    ) -> ApiResult<ContactPlacement> {
        self.owned_pipeline(company_id, pipeline_id).await?;
        self.store
            .get_placement(contact_id, pipeline_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Contact placement"))
    }

    /// Resolves a stage that must sit in `pipeline_id`; anything else is a
    /// field error on `field`.
    async fn stage_in_pipeline(&self, pipeline_id: Uuid, stage_id: Uuid, field: &str) -> ApiResult<Stage> {
        match self.store.get_stage(stage_id).await? {
            Some(stage) if stage.pipeline_id == pipeline_id => Ok(stage),
            Some(_) => Err(ApiError::validation(
                field,
                "Stage does not belong to this pipeline",
            )),
            None => Err(ApiError::validation(field, "Stage not found")),
        }
    }

    // Pipelines

    pub async fn list_pipelines(&self, company_id: Uuid) -> ApiResult<Vec<Pipeline>> {
        Ok(self.store.list_pipelines(company_id).await?)
    }

    pub async fn get_pipeline(&self, company_id: Uuid, id: Uuid) -> ApiResult<Pipeline> {
        self.owned_pipeline(company_id, id).await
    }

    pub async fn create_pipeline(&self, company_id: Uuid, req: CreatePipelineRequest) -> ApiResult<Pipeline> {
        let mut errors = Vec::new();
        let name = required(&req.name, "name", "Name").map_err(|e| errors.push(e)).ok();

        let stages: Vec<NewStage> = match req.stages.filter(|s| !s.is_empty()) {
            Some(inputs) => inputs
                .iter()
                .enumerate()
                .filter_map(|(i, input)| {
                    stage_input(input, &format!("stages[{i}].name"))
                        .map_err(|e| errors.push(e))
                        .ok()
                })
                .collect(),
            None => DEFAULT_STAGES
                .iter()
                .map(|(name, color)| NewStage {
                    name: name.to_string(),
                    color: color.to_string(),
                })
                .collect(),
        };
        into_result(errors)?;

        let pipeline = self
            .store
            .insert_pipeline(NewPipeline {
                company_id,
                name: name.unwrap_or_default(),
                description: req.description,
                stages,
            })
            .await?;
        info!(
            "Created pipeline {} with {} stages for company {company_id}",
            pipeline.id,
            pipeline.stages.len()
        );
        Ok(pipeline)
    }

    pub async fn update_pipeline(
        &self,
        company_id: Uuid,
        id: Uuid,
        mut req: UpdatePipelineRequest,
    ) -> ApiResult<Pipeline> {
        self.owned_pipeline(company_id, id).await?;
        if let Some(name) = req.name.as_deref() {
            req.name = Some(required(name, "name", "Name").map_err(|e| ApiError::Validation(vec![e]))?);
        }
        Ok(self.store.update_pipeline(id, req).await?)
    }

    pub async fn delete_pipeline(&self, company_id: Uuid, id: Uuid) -> ApiResult<()> {
        self.owned_pipeline(company_id, id).await?;
        self.store.delete_pipeline(id).await?;
        info!("Deleted pipeline {id}");
        Ok(())
    }

    /// Stages in column order, each with its deals and contacts in lane order.
    pub async fn get_board(&self, company_id: Uuid, id: Uuid) -> ApiResult<Board> {
        let pipeline = self.owned_pipeline(company_id, id).await?;
        let deals = self
            .store
            .list_deals(
                company_id,
                DealFilter {
                    pipeline_id: Some(id),
                    stage_id: None,
                },
            )
            .await?;
        let placements = self.store.list_placements(id).await?;

        let columns = pipeline
            .stages
            .iter()
            .map(|stage| {
                let mut stage_deals: Vec<Deal> = deals
                    .iter()
                    .filter(|d| d.stage_id == stage.id)
                    .cloned()
                    .collect();
                stage_deals.sort_by(|a, b| {
                    a.position
                        .cmp(&b.position)
                        .then(a.created_at.cmp(&b.created_at))
                });
                let mut contacts: Vec<ContactPlacement> = placements
                    .iter()
                    .filter(|p| p.stage_id == stage.id)
                    .cloned()
                    .collect();
                contacts.sort_by(|a, b| {
                    a.position
                        .cmp(&b.position)
                        .then(a.created_at.cmp(&b.created_at))
                });
                BoardColumn {
                    stage: stage.clone(),
                    deals: stage_deals,
                    contacts,
                }
            })
            .collect();

        Ok(Board {
            pipeline_id: pipeline.id,
            name: pipeline.name,
            columns,
        })
    }

    // Stages

    pub async fn list_stages(&self, company_id: Uuid, pipeline_id: Uuid) -> ApiResult<Vec<Stage>> {
        Ok(self.owned_pipeline(company_id, pipeline_id).await?.stages)
    }

    pub async fn add_stage(&self, company_id: Uuid, pipeline_id: Uuid, req: StageInput) -> ApiResult<Stage> {
        self.owned_pipeline(company_id, pipeline_id).await?;
        let new = stage_input(&req, "name").map_err(|e| ApiError::Validation(vec![e]))?;
        Ok(self.store.insert_stage(pipeline_id, new).await?)
    }

    pub async fn update_stage(&self, company_id: Uuid, id: Uuid, mut req: UpdateStageRequest) -> ApiResult<Stage> {
        self.owned_stage(company_id, id).await?;
        if let Some(name) = req.name.as_deref() {
            req.name = Some(
                required(name, "name", "Stage name").map_err(|e| ApiError::Validation(vec![e]))?,
            );
        }
        Ok(self.store.update_stage(id, req).await?)
    }

    pub async fn delete_stage(&self, company_id: Uuid, id: Uuid) -> ApiResult<()> {
        self.owned_stage(company_id, id).await?;
        self.store.delete_stage(id).await?;
        Ok(())
    }

    pub async fn reorder_stages(
        &self,
        company_id: Uuid,
        pipeline_id: Uuid,
        req: ReorderStagesRequest,
    ) -> ApiResult<Vec<Stage>> {
        let pipeline = self.owned_pipeline(company_id, pipeline_id).await?;
        let current: Vec<Uuid> = pipeline.stages.iter().map(|s| s.id).collect();
        let orders = ordering::plan_stage_reorder(&current, &req.stage_ids).map_err(
            |e: OrderingError| ApiError::validation("stageIds", &e.to_string()),
        )?;
        Ok(self.store.reorder_stages(pipeline_id, orders).await?)
    }

    // Contacts

    pub async fn list_contacts(&self, company_id: Uuid) -> ApiResult<Vec<Contact>> {
        Ok(self.store.list_contacts(company_id).await?)
    }

    pub async fn get_contact(&self, company_id: Uuid, id: Uuid) -> ApiResult<Contact> {
        self.owned_contact(company_id, id).await
    }

    pub async fn create_contact(&self, company_id: Uuid, req: CreateContactRequest) -> ApiResult<Contact> {
        let first_name = required(&req.first_name, "firstName", "First name")
            .map_err(|e| ApiError::Validation(vec![e]))?;
        Ok(self
            .store
            .insert_contact(NewContact {
                company_id,
                first_name,
                last_name: req.last_name,
                email: req.email,
                phone: req.phone,
            })
            .await?)
    }

    pub async fn update_contact(
        &self,
        company_id: Uuid,
        id: Uuid,
        mut req: UpdateContactRequest,
    ) -> ApiResult<Contact> {
        self.owned_contact(company_id, id).await?;
        if let Some(first_name) = req.first_name.as_deref() {
            req.first_name = Some(
                required(first_name, "firstName", "First name")
                    .map_err(|e| ApiError::Validation(vec![e]))?,
            );
        }
        Ok(self.store.update_contact(id, req).await?)
    }

    pub async fn delete_contact(&self, company_id: Uuid, id: Uuid) -> ApiResult<()> {
        self.owned_contact(company_id, id).await?;
        self.store.delete_contact(id).await?;
        Ok(())
    }

    // Deals

    pub async fn list_deals(&self, company_id: Uuid, filter: DealFilter) -> ApiResult<Vec<Deal>> {
        if let Some(pipeline_id) = filter.pipeline_id {
            self.owned_pipeline(company_id, pipeline_id).await?;
        }
        Ok(self.store.list_deals(company_id, filter).await?)
    }

    pub async fn get_deal(&self, company_id: Uuid, id: Uuid) -> ApiResult<Deal> {
        self.owned_deal(company_id, id).await
    }

    pub async fn create_deal(&self, company_id: Uuid, req: CreateDealRequest) -> ApiResult<Deal> {
        let mut errors = Vec::new();
        let name = required(&req.name, "name", "Name").map_err(|e| errors.push(e)).ok();
        let amount = req.amount.unwrap_or(0.0);
        let probability = req.probability.unwrap_or(0);
        check_amount(amount, "amount", &mut errors);
        check_probability(probability, &mut errors);
        into_result(errors)?;

        self.owned_pipeline(company_id, req.pipeline_id).await?;
        self.stage_in_pipeline(req.pipeline_id, req.stage_id, "stageId")
            .await?;
        self.owned_contact(company_id, req.contact_id).await?;

        let deal = self
            .store
            .insert_deal(NewDeal {
                company_id,
                pipeline_id: req.pipeline_id,
                stage_id: req.stage_id,
                contact_id: req.contact_id,
                organisation_id: req.organisation_id,
                name: name.unwrap_or_default(),
                amount,
                probability,
                expected_close_date: req.expected_close_date,
                notes: req.notes,
                status: req.status.unwrap_or_default(),
                priority: req.priority.unwrap_or_default(),
            })
            .await?;
        info!("Created deal {} in stage {}", deal.id, deal.stage_id);
        Ok(deal)
    }

    pub async fn update_deal(&self, company_id: Uuid, id: Uuid, mut req: UpdateDealRequest) -> ApiResult<Deal> {
        self.owned_deal(company_id, id).await?;

        let mut errors = Vec::new();
        if let Some(name) = req.name.as_deref() {
            match required(name, "name", "Name") {
                Ok(trimmed) => req.name = Some(trimmed),
                Err(e) => errors.push(e),
            }
        }
        if let Some(amount) = req.amount {
            check_amount(amount, "amount", &mut errors);
        }
        if let Some(probability) = req.probability {
            check_probability(probability, &mut errors);
        }
        into_result(errors)?;

        Ok(self.store.update_deal(id, req).await?)
    }

    pub async fn delete_deal(&self, company_id: Uuid, id: Uuid) -> ApiResult<()> {
        self.owned_deal(company_id, id).await?;
        self.store.delete_deal(id).await?;
        Ok(())
    }

    pub async fn move_deal(&self, company_id: Uuid, id: Uuid, req: MoveRequest) -> ApiResult<MoveResult> {
        self.move_item(
            company_id,
            MoveItemRequest {
                item_type: ItemType::Deal,
                item_id: id,
                pipeline_id: None,
                source_stage_id: req.source_stage_id,
                destination_stage_id: req.destination_stage_id,
                destination_index: req.destination_index,
                source_index: req.source_index,
            },
        )
        .await
    }

    // Contact placements

    pub async fn list_placements(&self, company_id: Uuid, pipeline_id: Uuid) -> ApiResult<Vec<ContactPlacement>> {
        self.owned_pipeline(company_id, pipeline_id).await?;
        Ok(self.store.list_placements(pipeline_id).await?)
    }

    pub async fn add_contact_to_pipeline(
        &self,
        company_id: Uuid,
        pipeline_id: Uuid,
        req: AddContactToPipelineRequest,
    ) -> ApiResult<ContactPlacement> {
        if let Some(value) = req.estimated_value {
            let mut errors = Vec::new();
            check_amount(value, "estimatedValue", &mut errors);
            into_result(errors)?;
        }
        self.owned_pipeline(company_id, pipeline_id).await?;
        self.owned_contact(company_id, req.contact_id).await?;
        self.stage_in_pipeline(pipeline_id, req.stage_id, "stageId")
            .await?;

        let placement = self
            .store
            .insert_placement(NewPlacement {
                contact_id: req.contact_id,
                pipeline_id,
                stage_id: req.stage_id,
                estimated_value: req.estimated_value,
                notes: req.notes,
            })
            .await?;
        info!(
            "Placed contact {} in pipeline {pipeline_id} stage {}",
            placement.contact_id, placement.stage_id
        );
        Ok(placement)
    }

    pub async fn update_placement(
        &self,
        company_id: Uuid,
        pipeline_id: Uuid,
        contact_id: Uuid,
        req: UpdatePlacementRequest,
    ) -> ApiResult<ContactPlacement> {
        if let Some(value) = req.estimated_value {
            let mut errors = Vec::new();
            check_amount(value, "estimatedValue", &mut errors);
            into_result(errors)?;
        }
        self.owned_placement(company_id, pipeline_id, contact_id)
            .await?;
        Ok(self
            .store
            .update_placement(contact_id, pipeline_id, req)
            .await?)
    }

    pub async fn remove_contact_from_pipeline(
        &self,
        company_id: Uuid,
        pipeline_id: Uuid,
        contact_id: Uuid,
    ) -> ApiResult<()> {
        self.owned_placement(company_id, pipeline_id, contact_id)
            .await?;
        self.store.delete_placement(contact_id, pipeline_id).await?;
        Ok(())
    }

    pub async fn move_contact(
        &self,
        company_id: Uuid,
        pipeline_id: Uuid,
        contact_id: Uuid,
        req: MoveRequest,
    ) -> ApiResult<MoveResult> {
        self.move_item(
            company_id,
            MoveItemRequest {
                item_type: ItemType::Contact,
                item_id: contact_id,
                pipeline_id: Some(pipeline_id),
                source_stage_id: req.source_stage_id,
                destination_stage_id: req.destination_stage_id,
                destination_index: req.destination_index,
                source_index: req.source_index,
            },
        )
        .await
    }

    // Move

    /// Drag-and-drop move of a deal or a contact placement.
    ///
    /// Resolves the item and its pipeline, checks the caller owns it and that
    /// both stages belong to that pipeline, then hands the splice to the store
    /// which re-checks the source stage under its own lock.
    pub async fn move_item(&self, company_id: Uuid, req: MoveItemRequest) -> ApiResult<MoveResult> {
        let (pipeline_id, target) = match req.item_type {
            ItemType::Deal => {
                let deal = self.owned_deal(company_id, req.item_id).await?;
                (deal.pipeline_id, MoveTarget::Deal(deal.id))
            }
            ItemType::Contact => {
                let pipeline_id = req.pipeline_id.ok_or_else(|| {
                    ApiError::validation("pipelineId", "Pipeline is required to move a contact")
                })?;
                let placement = self
                    .owned_placement(company_id, pipeline_id, req.item_id)
                    .await?;
                (
                    placement.pipeline_id,
                    MoveTarget::Contact {
                        contact_id: placement.contact_id,
                        pipeline_id: placement.pipeline_id,
                    },
                )
            }
        };

        if req.pipeline_id.is_some_and(|p| p != pipeline_id) {
            return Err(ApiError::validation(
                "pipelineId",
                "Item does not belong to this pipeline",
            ));
        }
        self.owned_pipeline(company_id, pipeline_id).await?;
        self.stage_in_pipeline(pipeline_id, req.source_stage_id, "sourceStageId")
            .await?;
        self.stage_in_pipeline(pipeline_id, req.destination_stage_id, "destinationStageId")
            .await?;

        let outcome = self
            .store
            .move_item(MoveCommand {
                target,
                source_stage_id: req.source_stage_id,
                destination_stage_id: req.destination_stage_id,
                destination_index: req.destination_index,
                source_index: req.source_index,
            })
            .await?;

        info!(
            "Moved {:?} {} from stage {} to stage {} at index {}",
            req.item_type, req.item_id, req.source_stage_id, outcome.stage_id, outcome.position
        );

        Ok(MoveResult {
            item_type: req.item_type,
            item_id: req.item_id,
            pipeline_id,
            stage_id: outcome.stage_id,
            position: outcome.position,
        })
    }

    // Automations

    pub async fn list_automations(&self, company_id: Uuid, pipeline_id: Uuid) -> ApiResult<Vec<Automation>> {
        self.owned_pipeline(company_id, pipeline_id).await?;
        Ok(self.store.list_automations(pipeline_id).await?)
    }

    pub async fn get_automation(&self, company_id: Uuid, id: Uuid) -> ApiResult<Automation> {
        self.owned_automation(company_id, id).await
    }

    pub async fn create_automation(&self, company_id: Uuid, req: CreateAutomationRequest) -> ApiResult<Automation> {
        let name = required(&req.name, "name", "Name").map_err(|e| ApiError::Validation(vec![e]))?;
        self.owned_pipeline(company_id, req.pipeline_id).await?;
        Ok(self
            .store
            .insert_automation(NewAutomation {
                pipeline_id: req.pipeline_id,
                name,
                description: req.description,
                trigger: req.trigger,
                conditions: req.conditions,
                actions: req.actions,
                is_active: req.is_active.unwrap_or(true),
            })
            .await?)
    }

    pub async fn update_automation(
        &self,
        company_id: Uuid,
        id: Uuid,
        mut req: UpdateAutomationRequest,
    ) -> ApiResult<Automation> {
        self.owned_automation(company_id, id).await?;
        if let Some(name) = req.name.as_deref() {
            req.name = Some(required(name, "name", "Name").map_err(|e| ApiError::Validation(vec![e]))?);
        }
        Ok(self.store.update_automation(id, req).await?)
    }

    pub async fn delete_automation(&self, company_id: Uuid, id: Uuid) -> ApiResult<()> {
        self.owned_automation(company_id, id).await?;
        self.store.delete_automation(id).await?;
        Ok(())
    }
}
