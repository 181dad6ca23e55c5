//! In-process store used by tests and `STORAGE_BACKEND=memory`.
//!
//! Every operation takes the single table lock for its whole duration, so a
//! move reads and renumbers its lanes without interleaving with other writers.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CrmStore, DatasetStore, MoveCommand, MoveOutcome, MoveTarget, NewAutomation, NewContact,
    NewDataset, NewDeal, NewPipeline, NewPlacement, NewRecord, NewStage, StoreError, StoreResult,
    CONTACT_ALREADY_PLACED, CONTACT_HAS_DEALS, SOURCE_STAGE_MISMATCH, STAGE_NOT_EMPTY,
};
use crate::crm::ordering::{self, Placement, PositionChange};
use crate::crm::types::{
    Automation, Contact, ContactPlacement, Deal, DealFilter, Pipeline, Stage,
    UpdateAutomationRequest, UpdateContactRequest, UpdateDealRequest, UpdatePipelineRequest,
    UpdatePlacementRequest, UpdateStageRequest,
};
use crate::engage::data::types::{
    DataRecord, Dataset, RecordPage, RecordSortField, SortOrder, UpdateDatasetRequest,
};

#[derive(Default)]
struct Tables {
    pipelines: HashMap<Uuid, Pipeline>,
    stages: HashMap<Uuid, Stage>,
    contacts: HashMap<Uuid, Contact>,
    deals: HashMap<Uuid, Deal>,
    placements: HashMap<(Uuid, Uuid), ContactPlacement>,
    automations: HashMap<Uuid, Automation>,
    datasets: HashMap<Uuid, Dataset>,
    records: HashMap<Uuid, DataRecord>,
}

impl Tables {
    fn stages_of(&self, pipeline_id: Uuid) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self
            .stages
            .values()
            .filter(|s| s.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.order);
        stages
    }

    fn assemble(&self, pipeline: &Pipeline) -> Pipeline {
        Pipeline {
            stages: self.stages_of(pipeline.id),
            ..pipeline.clone()
        }
    }

    fn deal_lane(&self, stage_id: Uuid) -> Vec<Placement> {
        self.deals
            .values()
            .filter(|d| d.stage_id == stage_id)
            .map(|d| Placement {
                id: d.id,
                stage_id: d.stage_id,
                position: d.position,
                created_at: d.created_at,
            })
            .collect()
    }

    /// Contact lanes are keyed by contact id; a stage belongs to one pipeline.
    fn contact_lane(&self, stage_id: Uuid) -> Vec<Placement> {
        self.placements
            .values()
            .filter(|p| p.stage_id == stage_id)
            .map(|p| Placement {
                id: p.contact_id,
                stage_id: p.stage_id,
                position: p.position,
                created_at: p.created_at,
            })
            .collect()
    }

    fn apply_deal_changes(&mut self, changes: &[PositionChange]) {
        for change in changes {
            if let Some(deal) = self.deals.get_mut(&change.id) {
                deal.stage_id = change.stage_id;
                deal.position = change.position;
            }
        }
    }

    fn apply_contact_changes(&mut self, pipeline_id: Uuid, changes: &[PositionChange]) {
        for change in changes {
            if let Some(placement) = self.placements.get_mut(&(change.id, pipeline_id)) {
                placement.stage_id = change.stage_id;
                placement.position = change.position;
            }
        }
    }

    fn record_count(&self, dataset_id: Uuid) -> i64 {
        self.records
            .values()
            .filter(|r| r.dataset_id == dataset_id)
            .count() as i64
    }

    fn with_count(&self, dataset: &Dataset) -> Dataset {
        Dataset {
            record_count: self.record_count(dataset.id),
            ..dataset.clone()
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str) -> StoreError {
    StoreError::NotFound(what.to_string())
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn list_pipelines(&self, company_id: Uuid) -> StoreResult<Vec<Pipeline>> {
        let tables = self.tables.read().await;
        let mut pipelines: Vec<Pipeline> = tables
            .pipelines
            .values()
            .filter(|p| p.company_id == company_id)
            .map(|p| tables.assemble(p))
            .collect();
        pipelines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pipelines)
    }

    async fn get_pipeline(&self, id: Uuid) -> StoreResult<Option<Pipeline>> {
        let tables = self.tables.read().await;
        Ok(tables.pipelines.get(&id).map(|p| tables.assemble(p)))
    }

    async fn insert_pipeline(&self, new: NewPipeline) -> StoreResult<Pipeline> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            name: new.name,
            description: new.description,
            stages: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        for (order, stage) in new.stages.into_iter().enumerate() {
            let stage = Stage {
                id: Uuid::new_v4(),
                pipeline_id: pipeline.id,
                name: stage.name,
                color: stage.color,
                order: order as i32,
                created_at: now,
            };
            tables.stages.insert(stage.id, stage);
        }

        tables.pipelines.insert(pipeline.id, pipeline.clone());
        Ok(tables.assemble(&pipeline))
    }

    async fn update_pipeline(&self, id: Uuid, patch: UpdatePipelineRequest) -> StoreResult<Pipeline> {
        let mut tables = self.tables.write().await;
        let pipeline = tables
            .pipelines
            .get_mut(&id)
            .ok_or_else(|| not_found("Pipeline"))?;
        if let Some(name) = patch.name {
            pipeline.name = name;
        }
        if let Some(description) = patch.description {
            pipeline.description = Some(description);
        }
        pipeline.updated_at = Utc::now();
        let pipeline = pipeline.clone();
        Ok(tables.assemble(&pipeline))
    }

    async fn delete_pipeline(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.pipelines.remove(&id).is_none() {
            return Err(not_found("Pipeline"));
        }
        tables.stages.retain(|_, s| s.pipeline_id != id);
        tables.deals.retain(|_, d| d.pipeline_id != id);
        tables.placements.retain(|_, p| p.pipeline_id != id);
        tables.automations.retain(|_, a| a.pipeline_id != id);
        Ok(())
    }

    async fn get_stage(&self, id: Uuid) -> StoreResult<Option<Stage>> {
        Ok(self.tables.read().await.stages.get(&id).cloned())
    }

    async fn insert_stage(&self, pipeline_id: Uuid, new: NewStage) -> StoreResult<Stage> {
        let mut tables = self.tables.write().await;
        if !tables.pipelines.contains_key(&pipeline_id) {
            return Err(not_found("Pipeline"));
        }
        let order = tables
            .stages_of(pipeline_id)
            .iter()
            .map(|s| s.order + 1)
            .max()
            .unwrap_or(0);
        let stage = Stage {
            id: Uuid::new_v4(),
            pipeline_id,
            name: new.name,
            color: new.color,
            order,
            created_at: Utc::now(),
        };
        tables.stages.insert(stage.id, stage.clone());
        Ok(stage)
    }

    async fn update_stage(&self, id: Uuid, patch: UpdateStageRequest) -> StoreResult<Stage> {
        let mut tables = self.tables.write().await;
        let stage = tables.stages.get_mut(&id).ok_or_else(|| not_found("Stage"))?;
        if let Some(name) = patch.name {
            stage.name = name;
        }
        if let Some(color) = patch.color {
            stage.color = color;
        }
        Ok(stage.clone())
    }

    async fn delete_stage(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.stages.contains_key(&id) {
            return Err(not_found("Stage"));
        }
        let occupied = tables.deals.values().any(|d| d.stage_id == id)
            || tables.placements.values().any(|p| p.stage_id == id);
        if occupied {
            return Err(StoreError::Conflict(STAGE_NOT_EMPTY.to_string()));
        }
        tables.stages.remove(&id);
        Ok(())
    }

    async fn reorder_stages(&self, pipeline_id: Uuid, orders: Vec<(Uuid, i32)>) -> StoreResult<Vec<Stage>> {
        let mut tables = self.tables.write().await;
        for (id, order) in orders {
            match tables.stages.get_mut(&id) {
                Some(stage) if stage.pipeline_id == pipeline_id => stage.order = order,
                _ => return Err(not_found("Stage")),
            }
        }
        Ok(tables.stages_of(pipeline_id))
    }

    async fn list_contacts(&self, company_id: Uuid) -> StoreResult<Vec<Contact>> {
        let tables = self.tables.read().await;
        let mut contacts: Vec<Contact> = tables
            .contacts
            .values()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect();
        contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(contacts)
    }

    async fn get_contact(&self, id: Uuid) -> StoreResult<Option<Contact>> {
        Ok(self.tables.read().await.contacts.get(&id).cloned())
    }

    async fn insert_contact(&self, new: NewContact) -> StoreResult<Contact> {
        let now = Utc::now();
        let contact = Contact {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            phone: new.phone,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .contacts
            .insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, id: Uuid, patch: UpdateContactRequest) -> StoreResult<Contact> {
        let mut tables = self.tables.write().await;
        let contact = tables
            .contacts
            .get_mut(&id)
            .ok_or_else(|| not_found("Contact"))?;
        if let Some(first_name) = patch.first_name {
            contact.first_name = first_name;
        }
        if patch.last_name.is_some() {
            contact.last_name = patch.last_name;
        }
        if patch.email.is_some() {
            contact.email = patch.email;
        }
        if patch.phone.is_some() {
            contact.phone = patch.phone;
        }
        contact.updated_at = Utc::now();
        Ok(contact.clone())
    }

    async fn delete_contact(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.contacts.contains_key(&id) {
            return Err(not_found("Contact"));
        }
        if tables.deals.values().any(|d| d.contact_id == id) {
            return Err(StoreError::Conflict(CONTACT_HAS_DEALS.to_string()));
        }

        let removed: Vec<ContactPlacement> = tables
            .placements
            .values()
            .filter(|p| p.contact_id == id)
            .cloned()
            .collect();
        tables.placements.retain(|_, p| p.contact_id != id);
        for placement in removed {
            let changes = ordering::plan_compaction(&tables.contact_lane(placement.stage_id));
            tables.apply_contact_changes(placement.pipeline_id, &changes);
        }

        tables.contacts.remove(&id);
        Ok(())
    }

    async fn list_deals(&self, company_id: Uuid, filter: DealFilter) -> StoreResult<Vec<Deal>> {
        let tables = self.tables.read().await;
        let mut deals: Vec<Deal> = tables
            .deals
            .values()
            .filter(|d| d.company_id == company_id)
            .filter(|d| filter.pipeline_id.map_or(true, |p| d.pipeline_id == p))
            .filter(|d| filter.stage_id.map_or(true, |s| d.stage_id == s))
            .cloned()
            .collect();
        deals.sort_by(|a, b| {
            a.stage_id
                .cmp(&b.stage_id)
                .then(a.position.cmp(&b.position))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(deals)
    }

    async fn get_deal(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        Ok(self.tables.read().await.deals.get(&id).cloned())
    }

    async fn insert_deal(&self, new: NewDeal) -> StoreResult<Deal> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            pipeline_id: new.pipeline_id,
            stage_id: new.stage_id,
            contact_id: new.contact_id,
            organisation_id: new.organisation_id,
            name: new.name,
            amount: new.amount,
            probability: new.probability,
            expected_close_date: new.expected_close_date,
            notes: new.notes,
            status: new.status,
            priority: new.priority,
            position: ordering::next_position(&tables.deal_lane(new.stage_id)),
            created_at: now,
            updated_at: now,
        };
        tables.deals.insert(deal.id, deal.clone());
        Ok(deal)
    }

    async fn update_deal(&self, id: Uuid, patch: UpdateDealRequest) -> StoreResult<Deal> {
        let mut tables = self.tables.write().await;
        let deal = tables.deals.get_mut(&id).ok_or_else(|| not_found("Deal"))?;
        if let Some(name) = patch.name {
            deal.name = name;
        }
        if let Some(amount) = patch.amount {
            deal.amount = amount;
        }
        if let Some(probability) = patch.probability {
            deal.probability = probability;
        }
        if patch.expected_close_date.is_some() {
            deal.expected_close_date = patch.expected_close_date;
        }
        if patch.notes.is_some() {
            deal.notes = patch.notes;
        }
        if let Some(status) = patch.status {
            deal.status = status;
        }
        if let Some(priority) = patch.priority {
            deal.priority = priority;
        }
        if patch.organisation_id.is_some() {
            deal.organisation_id = patch.organisation_id;
        }
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }

    async fn delete_deal(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let deal = tables.deals.remove(&id).ok_or_else(|| not_found("Deal"))?;
        let changes = ordering::plan_compaction(&tables.deal_lane(deal.stage_id));
        tables.apply_deal_changes(&changes);
        Ok(())
    }

    async fn list_placements(&self, pipeline_id: Uuid) -> StoreResult<Vec<ContactPlacement>> {
        let tables = self.tables.read().await;
        let mut placements: Vec<ContactPlacement> = tables
            .placements
            .values()
            .filter(|p| p.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        placements.sort_by(|a, b| {
            a.stage_id
                .cmp(&b.stage_id)
                .then(a.position.cmp(&b.position))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(placements)
    }

    async fn get_placement(&self, contact_id: Uuid, pipeline_id: Uuid) -> StoreResult<Option<ContactPlacement>> {
        Ok(self
            .tables
            .read()
            .await
            .placements
            .get(&(contact_id, pipeline_id))
            .cloned())
    }

    async fn insert_placement(&self, new: NewPlacement) -> StoreResult<ContactPlacement> {
        let mut tables = self.tables.write().await;
        let key = (new.contact_id, new.pipeline_id);
        if tables.placements.contains_key(&key) {
            return Err(StoreError::Conflict(CONTACT_ALREADY_PLACED.to_string()));
        }
        let now = Utc::now();
        let placement = ContactPlacement {
            contact_id: new.contact_id,
            pipeline_id: new.pipeline_id,
            stage_id: new.stage_id,
            estimated_value: new.estimated_value,
            notes: new.notes,
            position: ordering::next_position(&tables.contact_lane(new.stage_id)),
            created_at: now,
            updated_at: now,
        };
        tables.placements.insert(key, placement.clone());
        Ok(placement)
    }

    async fn update_placement(
        &self,
        contact_id: Uuid,
        pipeline_id: Uuid,
        patch: UpdatePlacementRequest,
    ) -> StoreResult<ContactPlacement> {
        let mut tables = self.tables.write().await;
        let placement = tables
            .placements
            .get_mut(&(contact_id, pipeline_id))
            .ok_or_else(|| not_found("Contact placement"))?;
        if patch.estimated_value.is_some() {
            placement.estimated_value = patch.estimated_value;
        }
        if patch.notes.is_some() {
            placement.notes = patch.notes;
        }
        placement.updated_at = Utc::now();
        Ok(placement.clone())
    }

    async fn delete_placement(&self, contact_id: Uuid, pipeline_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let placement = tables
            .placements
            .remove(&(contact_id, pipeline_id))
            .ok_or_else(|| not_found("Contact placement"))?;
        let changes = ordering::plan_compaction(&tables.contact_lane(placement.stage_id));
        tables.apply_contact_changes(pipeline_id, &changes);
        Ok(())
    }

    async fn move_item(&self, command: MoveCommand) -> StoreResult<MoveOutcome> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        match command.target {
            MoveTarget::Deal(id) => {
                let current = tables
                    .deals
                    .get(&id)
                    .map(|d| d.stage_id)
                    .ok_or_else(|| not_found("Deal"))?;
                if current != command.source_stage_id {
                    return Err(StoreError::Conflict(SOURCE_STAGE_MISMATCH.to_string()));
                }

                let plan = ordering::plan_move(
                    &tables.deal_lane(command.source_stage_id),
                    &tables.deal_lane(command.destination_stage_id),
                    id,
                    command.destination_stage_id,
                    command.destination_index,
                    command.source_index,
                )?;
                tables.apply_deal_changes(&plan.changes);
                if let Some(deal) = tables.deals.get_mut(&id) {
                    deal.updated_at = now;
                }

                Ok(MoveOutcome {
                    stage_id: command.destination_stage_id,
                    position: plan.index as i32,
                })
            }
            MoveTarget::Contact {
                contact_id,
                pipeline_id,
            } => {
                let current = tables
                    .placements
                    .get(&(contact_id, pipeline_id))
                    .map(|p| p.stage_id)
                    .ok_or_else(|| not_found("Contact placement"))?;
                if current != command.source_stage_id {
                    return Err(StoreError::Conflict(SOURCE_STAGE_MISMATCH.to_string()));
                }

                let plan = ordering::plan_move(
                    &tables.contact_lane(command.source_stage_id),
                    &tables.contact_lane(command.destination_stage_id),
                    contact_id,
                    command.destination_stage_id,
                    command.destination_index,
                    command.source_index,
                )?;
                tables.apply_contact_changes(pipeline_id, &plan.changes);
                if let Some(placement) = tables.placements.get_mut(&(contact_id, pipeline_id)) {
                    placement.updated_at = now;
                }

                Ok(MoveOutcome {
                    stage_id: command.destination_stage_id,
                    position: plan.index as i32,
                })
            }
        }
    }

    async fn list_automations(&self, pipeline_id: Uuid) -> StoreResult<Vec<Automation>> {
        let tables = self.tables.read().await;
        let mut automations: Vec<Automation> = tables
            .automations
            .values()
            .filter(|a| a.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        automations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(automations)
    }

    async fn get_automation(&self, id: Uuid) -> StoreResult<Option<Automation>> {
        Ok(self.tables.read().await.automations.get(&id).cloned())
    }

    async fn insert_automation(&self, new: NewAutomation) -> StoreResult<Automation> {
        let now = Utc::now();
        let automation = Automation {
            id: Uuid::new_v4(),
            pipeline_id: new.pipeline_id,
            name: new.name,
            description: new.description,
            trigger: new.trigger,
            conditions: new.conditions,
            actions: new.actions,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .automations
            .insert(automation.id, automation.clone());
        Ok(automation)
    }

    async fn update_automation(&self, id: Uuid, patch: UpdateAutomationRequest) -> StoreResult<Automation> {
        let mut tables = self.tables.write().await;
        let automation = tables
            .automations
            .get_mut(&id)
            .ok_or_else(|| not_found("Automation"))?;
        if let Some(name) = patch.name {
            automation.name = name;
        }
        if patch.description.is_some() {
            automation.description = patch.description;
        }
        if let Some(trigger) = patch.trigger {
            automation.trigger = trigger;
        }
        if let Some(conditions) = patch.conditions {
            automation.conditions = conditions;
        }
        if let Some(actions) = patch.actions {
            automation.actions = actions;
        }
        if let Some(is_active) = patch.is_active {
            automation.is_active = is_active;
        }
        automation.updated_at = Utc::now();
        Ok(automation.clone())
    }

    async fn delete_automation(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .automations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("Automation"))
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn list_datasets(&self, company_id: Uuid) -> StoreResult<Vec<Dataset>> {
        let tables = self.tables.read().await;
        let mut datasets: Vec<Dataset> = tables
            .datasets
            .values()
            .filter(|d| d.company_id == company_id)
            .map(|d| tables.with_count(d))
            .collect();
        datasets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(datasets)
    }

    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>> {
        let tables = self.tables.read().await;
        Ok(tables.datasets.get(&id).map(|d| tables.with_count(d)))
    }

    async fn find_by_webhook_id(&self, webhook_id: &str) -> StoreResult<Option<Dataset>> {
        let tables = self.tables.read().await;
        Ok(tables
            .datasets
            .values()
            .find(|d| d.webhook_id.as_deref() == Some(webhook_id))
            .map(|d| tables.with_count(d)))
    }

    async fn insert_dataset(&self, new: NewDataset) -> StoreResult<Dataset> {
        let mut tables = self.tables.write().await;
        if let Some(webhook_id) = new.webhook_id.as_deref() {
            if tables
                .datasets
                .values()
                .any(|d| d.webhook_id.as_deref() == Some(webhook_id))
            {
                return Err(StoreError::Conflict("Webhook ID already in use".to_string()));
            }
        }
        let now = Utc::now();
        let dataset = Dataset {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            name: new.name,
            description: new.description.unwrap_or_default(),
            dataset_type: new.dataset_type,
            webhook_id: new.webhook_id,
            webhook_secret: new.webhook_secret,
            record_count: 0,
            created_at: now,
            updated_at: now,
        };
        tables.datasets.insert(dataset.id, dataset.clone());
        Ok(dataset)
    }

    async fn update_dataset(&self, id: Uuid, patch: UpdateDatasetRequest) -> StoreResult<Dataset> {
        let mut tables = self.tables.write().await;
        let dataset = tables
            .datasets
            .get_mut(&id)
            .ok_or_else(|| not_found("Dataset"))?;
        if let Some(name) = patch.name.filter(|n| !n.is_empty()) {
            dataset.name = name;
        }
        if let Some(description) = patch.description {
            dataset.description = description;
        }
        dataset.updated_at = Utc::now();
        let dataset = dataset.clone();
        Ok(tables.with_count(&dataset))
    }

    async fn set_webhook_secret(&self, id: Uuid, secret: String) -> StoreResult<Dataset> {
        let mut tables = self.tables.write().await;
        let dataset = tables
            .datasets
            .get_mut(&id)
            .ok_or_else(|| not_found("Dataset"))?;
        dataset.webhook_secret = Some(secret);
        dataset.updated_at = Utc::now();
        let dataset = dataset.clone();
        Ok(tables.with_count(&dataset))
    }

    async fn delete_dataset(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.datasets.remove(&id).is_none() {
            return Err(not_found("Dataset"));
        }
        tables.records.retain(|_, r| r.dataset_id != id);
        Ok(())
    }

    async fn list_records(&self, dataset_id: Uuid, page: RecordPage) -> StoreResult<(Vec<DataRecord>, i64)> {
        let tables = self.tables.read().await;
        let mut records: Vec<DataRecord> = tables
            .records
            .values()
            .filter(|r| r.dataset_id == dataset_id)
            .cloned()
            .collect();

        records.sort_by(|a, b| {
            let by_field = match page.sort_by {
                RecordSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                RecordSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            let ordered = match page.sort_order {
                SortOrder::Asc => by_field,
                SortOrder::Desc => by_field.reverse(),
            };
            match ordered {
                Ordering::Equal => a.id.cmp(&b.id),
                other => other,
            }
        });

        let total = records.len() as i64;
        let page_records = records
            .into_iter()
            .skip(page.offset().max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect();
        Ok((page_records, total))
    }

    async fn insert_record(&self, dataset_id: Uuid, record: NewRecord) -> StoreResult<DataRecord> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let dataset = tables
            .datasets
            .get_mut(&dataset_id)
            .ok_or_else(|| not_found("Dataset"))?;
        dataset.updated_at = now;

        let record = DataRecord {
            id: Uuid::new_v4(),
            dataset_id,
            data: record.data,
            metadata: record.metadata,
            created_at: now,
            updated_at: now,
        };
        tables.records.insert(record.id, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::types::{DealPriority, DealStatus};

    async fn seeded() -> (MemoryStore, Pipeline, Contact) {
        let store = MemoryStore::new();
        let company_id = Uuid::new_v4();
        let pipeline = store
            .insert_pipeline(NewPipeline {
                company_id,
                name: "Sales".into(),
                description: None,
                stages: ["Lead", "Contacted", "Won"]
                    .iter()
                    .map(|n| NewStage {
                        name: n.to_string(),
                        color: "#e3f2fd".into(),
                    })
                    .collect(),
            })
            .await
            .unwrap();
        let contact = store
            .insert_contact(NewContact {
                company_id,
                first_name: "Ada".into(),
                last_name: None,
                email: None,
                phone: None,
            })
            .await
            .unwrap();
        (store, pipeline, contact)
    }

    fn new_deal(pipeline: &Pipeline, stage: usize, contact: &Contact, name: &str) -> NewDeal {
        NewDeal {
            company_id: pipeline.company_id,
            pipeline_id: pipeline.id,
            stage_id: pipeline.stages[stage].id,
            contact_id: contact.id,
            organisation_id: None,
            name: name.into(),
            amount: 100.0,
            probability: 10,
            expected_close_date: None,
            notes: None,
            status: DealStatus::Open,
            priority: DealPriority::Medium,
        }
    }

    #[tokio::test]
    async fn test_deals_append_and_compact() {
        let (store, pipeline, contact) = seeded().await;
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let deal = store.insert_deal(new_deal(&pipeline, 0, &contact, name)).await.unwrap();
            ids.push(deal.id);
        }
        assert_eq!(store.get_deal(ids[2]).await.unwrap().unwrap().position, 2);

        store.delete_deal(ids[0]).await.unwrap();
        let deals = store.list_deals(pipeline.company_id, DealFilter::default()).await.unwrap();
        let positions: Vec<(Uuid, i32)> = deals.iter().map(|d| (d.id, d.position)).collect();
        assert_eq!(positions, vec![(ids[1], 0), (ids[2], 1)]);
    }

    #[tokio::test]
    async fn test_move_rejects_stale_source_stage() {
        let (store, pipeline, contact) = seeded().await;
        let deal = store.insert_deal(new_deal(&pipeline, 0, &contact, "a")).await.unwrap();

        let err = store
            .move_item(MoveCommand {
                target: MoveTarget::Deal(deal.id),
                source_stage_id: pipeline.stages[1].id,
                destination_stage_id: pipeline.stages[2].id,
                destination_index: 0,
                source_index: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_placement_conflicts() {
        let (store, pipeline, contact) = seeded().await;
        let placement = NewPlacement {
            contact_id: contact.id,
            pipeline_id: pipeline.id,
            stage_id: pipeline.stages[0].id,
            estimated_value: None,
            notes: None,
        };
        store.insert_placement(placement.clone()).await.unwrap();
        let err = store
            .insert_placement(NewPlacement {
                stage_id: pipeline.stages[1].id,
                ..placement
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(msg) if msg == CONTACT_ALREADY_PLACED));
        assert_eq!(store.list_placements(pipeline.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_stage_refuses_occupied_stage() {
        let (store, pipeline, contact) = seeded().await;
        store.insert_deal(new_deal(&pipeline, 1, &contact, "a")).await.unwrap();

        assert!(matches!(
            store.delete_stage(pipeline.stages[1].id).await,
            Err(StoreError::Conflict(_))
        ));
        store.delete_stage(pipeline.stages[2].id).await.unwrap();

        let stages = store.get_pipeline(pipeline.id).await.unwrap().unwrap().stages;
        assert_eq!(stages.iter().map(|s| s.order).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_delete_pipeline_cascades() {
        let (store, pipeline, contact) = seeded().await;
        store.insert_deal(new_deal(&pipeline, 0, &contact, "a")).await.unwrap();
        store.delete_pipeline(pipeline.id).await.unwrap();

        assert!(store.get_stage(pipeline.stages[0].id).await.unwrap().is_none());
        assert!(store
            .list_deals(pipeline.company_id, DealFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_records_paginate_and_count() {
        let store = MemoryStore::new();
        let dataset = store
            .insert_dataset(NewDataset {
                company_id: Uuid::new_v4(),
                name: "Leads".into(),
                description: None,
                dataset_type: Default::default(),
                webhook_id: None,
                webhook_secret: None,
            })
            .await
            .unwrap();
        for i in 0..5 {
            store
                .insert_record(
                    dataset.id,
                    NewRecord {
                        data: serde_json::json!({ "n": i }),
                        metadata: serde_json::json!({}),
                    },
                )
                .await
                .unwrap();
        }

        let page = RecordPage {
            page: 2,
            limit: 2,
            ..RecordPage::default()
        };
        let (records, total) = store.list_records(dataset.id, page).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(records.len(), 2);
        assert_eq!(store.get_dataset(dataset.id).await.unwrap().unwrap().record_count, 5);
    }
}
