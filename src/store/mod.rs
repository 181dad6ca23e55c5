//! Data-access ports.
//!
//! Services only see the [`CrmStore`] and [`DatasetStore`] traits; `main`
//! decides which adapter backs them and hands it over through `AppState`.
//! Stores know nothing about tenants beyond the `company_id` columns they
//! persist: ownership checks happen in the services.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::crm::ordering::OrderingError;
use crate::crm::types::{
    Automation, AutomationAction, AutomationCondition, AutomationTrigger, Contact,
    ContactPlacement, Deal, DealFilter, DealPriority, DealStatus, Pipeline, Stage,
    UpdateAutomationRequest, UpdateContactRequest, UpdateDealRequest, UpdatePipelineRequest,
    UpdatePlacementRequest, UpdateStageRequest,
};
use crate::engage::data::types::{
    DataRecord, Dataset, DatasetType, RecordPage, UpdateDatasetRequest,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Connection pool error: {0}")]
    Pool(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<OrderingError> for StoreError {
    fn from(err: OrderingError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub const STAGE_NOT_EMPTY: &str = "Stage still contains deals or contacts";
pub const CONTACT_HAS_DEALS: &str = "Contact is referenced by existing deals";
pub const CONTACT_ALREADY_PLACED: &str = "Contact is already in this pipeline";
pub const SOURCE_STAGE_MISMATCH: &str = "Item is no longer in the source stage";

#[derive(Debug, Clone)]
pub struct NewStage {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct NewPipeline {
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stages: Vec<NewStage>,
}

#[derive(Debug, Clone)]
pub struct NewContact {
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDeal {
    pub company_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub contact_id: Uuid,
    pub organisation_id: Option<Uuid>,
    pub name: String,
    pub amount: f64,
    pub probability: i32,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: DealStatus,
    pub priority: DealPriority,
}

#[derive(Debug, Clone)]
pub struct NewPlacement {
    pub contact_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAutomation {
    pub pipeline_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: AutomationTrigger,
    pub conditions: Vec<AutomationCondition>,
    pub actions: Vec<AutomationAction>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    Deal(Uuid),
    Contact { contact_id: Uuid, pipeline_id: Uuid },
}

#[derive(Debug, Clone, Copy)]
pub struct MoveCommand {
    pub target: MoveTarget,
    pub source_stage_id: Uuid,
    pub destination_stage_id: Uuid,
    pub destination_index: usize,
    pub source_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub stage_id: Uuid,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct NewDataset {
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub dataset_type: DatasetType,
    pub webhook_id: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub data: serde_json::Value,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn list_pipelines(&self, company_id: Uuid) -> StoreResult<Vec<Pipeline>>;
    async fn get_pipeline(&self, id: Uuid) -> StoreResult<Option<Pipeline>>;
    async fn insert_pipeline(&self, new: NewPipeline) -> StoreResult<Pipeline>;
    async fn update_pipeline(&self, id: Uuid, patch: UpdatePipelineRequest) -> StoreResult<Pipeline>;
    /// Removes the pipeline with its stages, deals, placements and automations.
    async fn delete_pipeline(&self, id: Uuid) -> StoreResult<()>;

    async fn get_stage(&self, id: Uuid) -> StoreResult<Option<Stage>>;
    /// Appends a stage after the current highest order.
    async fn insert_stage(&self, pipeline_id: Uuid, new: NewStage) -> StoreResult<Stage>;
    async fn update_stage(&self, id: Uuid, patch: UpdateStageRequest) -> StoreResult<Stage>;
    /// Fails with a conflict while the stage still holds deals or contacts.
    async fn delete_stage(&self, id: Uuid) -> StoreResult<()>;
    async fn reorder_stages(&self, pipeline_id: Uuid, orders: Vec<(Uuid, i32)>) -> StoreResult<Vec<Stage>>;

    async fn list_contacts(&self, company_id: Uuid) -> StoreResult<Vec<Contact>>;
    async fn get_contact(&self, id: Uuid) -> StoreResult<Option<Contact>>;
    async fn insert_contact(&self, new: NewContact) -> StoreResult<Contact>;
    async fn update_contact(&self, id: Uuid, patch: UpdateContactRequest) -> StoreResult<Contact>;
    /// Fails with a conflict while deals reference the contact; placements go with it.
    async fn delete_contact(&self, id: Uuid) -> StoreResult<()>;

    /// Deals of a company in (stage, position) order.
    async fn list_deals(&self, company_id: Uuid, filter: DealFilter) -> StoreResult<Vec<Deal>>;
    async fn get_deal(&self, id: Uuid) -> StoreResult<Option<Deal>>;
    /// Appends the deal at the end of its stage.
    async fn insert_deal(&self, new: NewDeal) -> StoreResult<Deal>;
    async fn update_deal(&self, id: Uuid, patch: UpdateDealRequest) -> StoreResult<Deal>;
    /// Deletes the deal and closes the gap it leaves in its stage.
    async fn delete_deal(&self, id: Uuid) -> StoreResult<()>;

    async fn list_placements(&self, pipeline_id: Uuid) -> StoreResult<Vec<ContactPlacement>>;
    async fn get_placement(&self, contact_id: Uuid, pipeline_id: Uuid) -> StoreResult<Option<ContactPlacement>>;
    async fn insert_placement(&self, new: NewPlacement) -> StoreResult<ContactPlacement>;
    async fn update_placement(
        &self,
        contact_id: Uuid,
        pipeline_id: Uuid,
        patch: UpdatePlacementRequest,
    ) -> StoreResult<ContactPlacement>;
    async fn delete_placement(&self, contact_id: Uuid, pipeline_id: Uuid) -> StoreResult<()>;

    /// Atomically re-reads the item, checks it still sits where the caller
    /// believes, then persists the renumbering of both lanes.
    async fn move_item(&self, command: MoveCommand) -> StoreResult<MoveOutcome>;

    async fn list_automations(&self, pipeline_id: Uuid) -> StoreResult<Vec<Automation>>;
    async fn get_automation(&self, id: Uuid) -> StoreResult<Option<Automation>>;
    async fn insert_automation(&self, new: NewAutomation) -> StoreResult<Automation>;
    async fn update_automation(&self, id: Uuid, patch: UpdateAutomationRequest) -> StoreResult<Automation>;
    async fn delete_automation(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn list_datasets(&self, company_id: Uuid) -> StoreResult<Vec<Dataset>>;
    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>>;
    async fn find_by_webhook_id(&self, webhook_id: &str) -> StoreResult<Option<Dataset>>;
    async fn insert_dataset(&self, new: NewDataset) -> StoreResult<Dataset>;
    async fn update_dataset(&self, id: Uuid, patch: UpdateDatasetRequest) -> StoreResult<Dataset>;
    async fn set_webhook_secret(&self, id: Uuid, secret: String) -> StoreResult<Dataset>;
    /// Removes the dataset and all of its records.
    async fn delete_dataset(&self, id: Uuid) -> StoreResult<()>;

    async fn list_records(&self, dataset_id: Uuid, page: RecordPage) -> StoreResult<(Vec<DataRecord>, i64)>;
    async fn insert_record(&self, dataset_id: Uuid, record: NewRecord) -> StoreResult<DataRecord>;
}
