//! Row types for the diesel schema and their conversions into domain types.
//! Enum columns are stored as their wire strings.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::{
    automations, contact_pipeline_stages, contacts, data_records, datasets, deals, pipeline_stages,
    pipelines,
};
use crate::crm::ordering::Placement;
use crate::crm::types::{
    Automation, Contact, ContactPlacement, Deal, Pipeline, Stage,
};
use crate::engage::data::types::{DataRecord, Dataset};
use crate::store::StoreError;

fn corrupt(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Database(format!("Invalid value in column {column}: {err}"))
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pipelines)]
pub struct PipelineRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRow {
    pub fn into_pipeline(self, stages: Vec<Stage>) -> Pipeline {
        Pipeline {
            id: self.id,
            company_id: self.company_id,
            name: self.name,
            description: self.description,
            stages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = pipeline_stages)]
pub struct StageRow {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub color: String,
    pub stage_order: i32,
    pub created_at: DateTime<Utc>,
}

impl From<StageRow> for Stage {
    fn from(row: StageRow) -> Self {
        Stage {
            id: row.id,
            pipeline_id: row.pipeline_id,
            name: row.name,
            color: row.color,
            order: row.stage_order,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = contacts)]
pub struct ContactRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            company_id: row.company_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = contacts)]
pub struct ContactChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = deals)]
pub struct DealRow {
    pub id: Uuid,
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
    pub status: String,
    pub priority: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DealRow {
    pub fn placement(&self) -> Placement {
        Placement {
            id: self.id,
            stage_id: self.stage_id,
            position: self.position,
            created_at: self.created_at,
        }
    }
}

impl TryFrom<DealRow> for Deal {
    type Error = StoreError;

    fn try_from(row: DealRow) -> Result<Self, Self::Error> {
        Ok(Deal {
            id: row.id,
            company_id: row.company_id,
            pipeline_id: row.pipeline_id,
            stage_id: row.stage_id,
            contact_id: row.contact_id,
            organisation_id: row.organisation_id,
            name: row.name,
            amount: row.amount,
            probability: row.probability,
            expected_close_date: row.expected_close_date,
            notes: row.notes,
            status: row.status.parse().map_err(|e| corrupt("deals.status", e))?,
            priority: row.priority.parse().map_err(|e| corrupt("deals.priority", e))?,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = deals)]
pub struct DealChanges {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub organisation_id: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = contact_pipeline_stages)]
pub struct PlacementRow {
    pub contact_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlacementRow {
    pub fn placement(&self) -> Placement {
        Placement {
            id: self.contact_id,
            stage_id: self.stage_id,
            position: self.position,
            created_at: self.created_at,
        }
    }
}

impl From<PlacementRow> for ContactPlacement {
    fn from(row: PlacementRow) -> Self {
        ContactPlacement {
            contact_id: row.contact_id,
            pipeline_id: row.pipeline_id,
            stage_id: row.stage_id,
            estimated_value: row.estimated_value,
            notes: row.notes,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = automations)]
pub struct AutomationRow {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: String,
    pub conditions: serde_json::Value,
    pub actions: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AutomationRow> for Automation {
    type Error = StoreError;

    fn try_from(row: AutomationRow) -> Result<Self, Self::Error> {
        Ok(Automation {
            id: row.id,
            pipeline_id: row.pipeline_id,
            name: row.name,
            description: row.description,
            trigger: row
                .trigger
                .parse()
                .map_err(|e| corrupt("automations.trigger", e))?,
            conditions: serde_json::from_value(row.conditions)
                .map_err(|e| corrupt("automations.conditions", e))?,
            actions: serde_json::from_value(row.actions)
                .map_err(|e| corrupt("automations.actions", e))?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = automations)]
pub struct AutomationChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger: Option<String>,
    pub conditions: Option<serde_json::Value>,
    pub actions: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = datasets)]
pub struct DatasetRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: String,
    pub dataset_type: String,
    pub webhook_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatasetRow {
    pub fn into_dataset(self, record_count: i64) -> Result<Dataset, StoreError> {
        Ok(Dataset {
            id: self.id,
            company_id: self.company_id,
            name: self.name,
            description: self.description,
            dataset_type: self
                .dataset_type
                .parse()
                .map_err(|e| corrupt("datasets.dataset_type", e))?,
            webhook_id: self.webhook_id,
            webhook_secret: self.webhook_secret,
            record_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = data_records)]
pub struct RecordRow {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub data: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecordRow> for DataRecord {
    fn from(row: RecordRow) -> Self {
        DataRecord {
            id: row.id,
            dataset_id: row.dataset_id,
            data: row.data,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
