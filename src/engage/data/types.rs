use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::shared::response::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    #[default]
    Manual,
    Upload,
    Webhook,
}

impl DatasetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Upload => "upload",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "upload" => Ok(Self::Upload),
            "webhook" => Ok(Self::Webhook),
            other => Err(format!("Unknown dataset type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub dataset_type: DatasetType,
    pub webhook_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub record_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub data: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatasetRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub dataset_type: DatasetType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDatasetRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum RecordSortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Raw query string of the record listing; validated into a [`RecordPage`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<RecordSortField>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPage {
    pub page: i64,
    pub limit: i64,
    pub sort_by: RecordSortField,
    pub sort_order: SortOrder,
}

impl RecordPage {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Only constructed through `record_page`, which rejects pages whose
    /// offset overflows.
    pub fn offset(&self) -> i64 {
        Pagination::offset(self.page, self.limit).unwrap_or(i64::MAX)
    }
}

impl Default for RecordPage {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
            sort_by: RecordSortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    pub row: usize,
    pub data: serde_json::Value,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub dataset: Dataset,
    pub imported: usize,
    pub errors: usize,
    pub error_details: Vec<ImportRowError>,
}

/// Optional form fields sent next to the uploaded file.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dataset_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReceipt {
    pub record_id: Uuid,
}

/// Request facts recorded next to every webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetadata {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub referrer: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_type_defaults_to_manual() {
        let req: CreateDatasetRequest =
            serde_json::from_value(serde_json::json!({"name": "Leads"})).unwrap();
        assert_eq!(req.dataset_type, DatasetType::Manual);

        let req: CreateDatasetRequest =
            serde_json::from_value(serde_json::json!({"name": "Hook", "type": "webhook"}))
                .unwrap();
        assert_eq!(req.dataset_type, DatasetType::Webhook);
    }

    #[test]
    fn test_record_query_parsing() {
        let q: RecordQuery = serde_json::from_value(serde_json::json!({
            "page": 2, "limit": 50, "sortBy": "updatedAt", "sortOrder": "asc"
        }))
        .unwrap();
        assert_eq!(q.sort_by, Some(RecordSortField::UpdatedAt));
        assert_eq!(q.sort_order, Some(SortOrder::Asc));

        assert!(serde_json::from_value::<RecordQuery>(serde_json::json!({"sortBy": "name"})).is_err());
    }

    #[test]
    fn test_record_page_offset() {
        let page = RecordPage {
            page: 3,
            limit: 10,
            ..RecordPage::default()
        };
        assert_eq!(page.offset(), 20);
    }

    #[test]
    fn test_dataset_wire_name_for_type() {
        let now = Utc::now();
        let dataset = Dataset {
            id: Uuid::nil(),
            company_id: Uuid::nil(),
            name: "Hook".into(),
            description: String::new(),
            dataset_type: DatasetType::Webhook,
            webhook_id: Some("abc".into()),
            webhook_secret: None,
            record_count: 0,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&dataset).unwrap();
        assert_eq!(value["type"], "webhook");
        assert_eq!(value["webhookId"], "abc");
        assert_eq!(value["recordCount"], 0);
    }
}
