use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::import::{self, ImportError};
use super::types::{
    CreateDatasetRequest, DataRecord, Dataset, DatasetType, ImportOptions, ImportRowError,
    ImportSummary, RecordPage, RecordQuery, UpdateDatasetRequest, WebhookMetadata,
    WebhookReceipt,
};
use crate::core::shared::error::{ApiError, ApiResult, FieldError};
use crate::core::shared::response::Pagination;
use crate::core::shared::utils::{
    constant_time_compare, generate_webhook_id, generate_webhook_secret,
};
use crate::store::{DatasetStore, NewDataset, NewRecord};

const IMPORTED_DATASET_NAME: &str = "Imported Data";
const IMPORTED_DATASET_DESCRIPTION: &str = "Data imported from file";

/// Validates the raw listing query into a page request.
pub fn record_page(query: &RecordQuery) -> ApiResult<RecordPage> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(RecordPage::DEFAULT_LIMIT);

    let mut errors = Vec::new();
    if page < 1 {
        errors.push(FieldError::new("page", "Page must be at least 1"));
    } else if limit >= 1 && Pagination::offset(page, limit).is_none() {
        errors.push(FieldError::new("page", "Page is out of range"));
    }
    if !(1..=RecordPage::MAX_LIMIT).contains(&limit) {
        errors.push(FieldError::new(
            "limit",
            &format!("Limit must be between 1 and {}", RecordPage::MAX_LIMIT),
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    Ok(RecordPage {
        page,
        limit,
        sort_by: query.sort_by.unwrap_or_default(),
        sort_order: query.sort_order.unwrap_or_default(),
    })
}

pub struct DataService {
    store: Arc<dyn DatasetStore>,
}

impl DataService {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self { store }
    }

    async fn owned_dataset(&self, company_id: Uuid, id: Uuid) -> ApiResult<Dataset> {
        let dataset = self
            .store
            .get_dataset(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Dataset"))?;
        if dataset.company_id != company_id {
            warn!("Company {company_id} denied access to dataset {id}");
            return Err(ApiError::access_denied());
        }
        Ok(dataset)
    }

    pub async fn list_datasets(&self, company_id: Uuid) -> ApiResult<Vec<Dataset>> {
        Ok(self.store.list_datasets(company_id).await?)
    }

    pub async fn get_dataset(&self, company_id: Uuid, id: Uuid) -> ApiResult<Dataset> {
        self.owned_dataset(company_id, id).await
    }

    pub async fn create_dataset(&self, company_id: Uuid, req: CreateDatasetRequest) -> ApiResult<Dataset> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("name", "Name is required"));
        }

        let (webhook_id, webhook_secret) = match req.dataset_type {
            DatasetType::Webhook => (Some(generate_webhook_id()), Some(generate_webhook_secret())),
            _ => (None, None),
        };

        let dataset = self
            .store
            .insert_dataset(NewDataset {
                company_id,
                name: name.to_string(),
                description: req.description,
                dataset_type: req.dataset_type,
                webhook_id,
                webhook_secret,
            })
            .await?;
        info!(
            "Created {} dataset {} for company {company_id}",
            dataset.dataset_type, dataset.id
        );
        Ok(dataset)
    }

    pub async fn update_dataset(
        &self,
        company_id: Uuid,
        id: Uuid,
        req: UpdateDatasetRequest,
    ) -> ApiResult<Dataset> {
        self.owned_dataset(company_id, id).await?;
        let patch = UpdateDatasetRequest {
            name: req
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            description: req.description,
        };
        Ok(self.store.update_dataset(id, patch).await?)
    }

    pub async fn delete_dataset(&self, company_id: Uuid, id: Uuid) -> ApiResult<()> {
        self.owned_dataset(company_id, id).await?;
        self.store.delete_dataset(id).await?;
        info!("Deleted dataset {id} and its records");
        Ok(())
    }

    pub async fn regenerate_webhook_secret(&self, company_id: Uuid, id: Uuid) -> ApiResult<Dataset> {
        let dataset = self.owned_dataset(company_id, id).await?;
        if dataset.dataset_type != DatasetType::Webhook {
            return Err(ApiError::BadRequest(
                "Dataset is not a webhook type".to_string(),
            ));
        }
        let dataset = self
            .store
            .set_webhook_secret(id, generate_webhook_secret())
            .await?;
        info!("Regenerated webhook secret for dataset {id}");
        Ok(dataset)
    }

    pub async fn list_records(
        &self,
        company_id: Uuid,
        id: Uuid,
        query: &RecordQuery,
    ) -> ApiResult<(Vec<DataRecord>, Pagination)> {
        let page = record_page(query)?;
        self.owned_dataset(company_id, id).await?;
        let (records, total) = self.store.list_records(id, page).await?;
        Ok((records, Pagination::new(page.page, page.limit, total)))
    }

    pub async fn add_record(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        id: Uuid,
        data: Value,
    ) -> ApiResult<DataRecord> {
        self.owned_dataset(company_id, id).await?;
        let metadata = json!({
            "addedBy": user_id,
            "addedAt": Utc::now(),
            "source": "manual",
        });
        Ok(self
            .store
            .insert_record(id, NewRecord { data, metadata })
            .await?)
    }

    /// Parses an uploaded file and stores one record per data row. Rows that
    /// fail to parse or insert are reported instead of aborting the import.
    pub async fn import_file(
        &self,
        company_id: Uuid,
        filename: &str,
        bytes: &[u8],
        options: ImportOptions,
    ) -> ApiResult<ImportSummary> {
        let rows = import::parse_file(filename, bytes).map_err(|e| match e {
            ImportError::UnsupportedFormat | ImportError::SpreadsheetsDisabled => {
                ApiError::BadRequest(e.to_string())
            }
            other => ApiError::BadRequest(format!("Failed to parse file: {other}")),
        })?;
        if rows.is_empty() {
            return Err(ApiError::BadRequest("File contains no data".to_string()));
        }

        let dataset = match options.dataset_id {
            Some(id) => self.owned_dataset(company_id, id).await?,
            None => {
                let name = options
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| IMPORTED_DATASET_NAME.to_string());
                let description = options
                    .description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| IMPORTED_DATASET_DESCRIPTION.to_string());
                self.create_dataset(
                    company_id,
                    CreateDatasetRequest {
                        name,
                        description: Some(description),
                        dataset_type: DatasetType::Upload,
                    },
                )
                .await?
            }
        };

        let mut imported = 0;
        let mut error_details = Vec::new();
        for parsed in rows {
            let data = match parsed.data {
                Ok(data) => data,
                Err(error) => {
                    error_details.push(ImportRowError {
                        row: parsed.row,
                        data: Value::Null,
                        error,
                    });
                    continue;
                }
            };
            let record = NewRecord {
                data: data.clone(),
                metadata: json!({ "source": "file_import" }),
            };
            match self.store.insert_record(dataset.id, record).await {
                Ok(_) => imported += 1,
                Err(e) => {
                    warn!("Import into dataset {} failed at row {}: {e}", dataset.id, parsed.row);
                    error_details.push(ImportRowError {
                        row: parsed.row,
                        data,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Imported {imported} rows from {filename} into dataset {} ({} errors)",
            dataset.id,
            error_details.len()
        );

        let dataset = self
            .store
            .get_dataset(dataset.id)
            .await?
            .unwrap_or(dataset);
        Ok(ImportSummary {
            dataset,
            imported,
            errors: error_details.len(),
            error_details,
        })
    }

    /// Stores a payload posted to a webhook dataset. Not tenant scoped: the
    /// webhook id and secret are the only credentials.
    pub async fn ingest_webhook(
        &self,
        webhook_id: &str,
        secret: Option<&str>,
        payload: Value,
        metadata: WebhookMetadata,
    ) -> ApiResult<WebhookReceipt> {
        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Webhook secret is required".to_string()))?;

        let dataset = self
            .store
            .find_by_webhook_id(webhook_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Invalid webhook ID".to_string()))?;

        let expected = dataset.webhook_secret.as_deref().unwrap_or_default();
        if expected.is_empty() || !constant_time_compare(expected, secret) {
            warn!("Rejected webhook delivery for dataset {}: bad secret", dataset.id);
            return Err(ApiError::Unauthorized("Invalid webhook secret".to_string()));
        }

        let metadata = serde_json::to_value(&metadata)
            .map_err(|e| ApiError::Internal(format!("Failed to encode webhook metadata: {e}")))?;
        let record = self
            .store
            .insert_record(
                dataset.id,
                NewRecord {
                    data: payload,
                    metadata,
                },
            )
            .await?;
        info!("Webhook record {} stored in dataset {}", record.id, dataset.id);
        Ok(WebhookReceipt {
            record_id: record.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::error::ErrorKind;
    use crate::engage::data::types::{RecordSortField, SortOrder};
    use crate::store::MemoryStore;
    use crate::{assert_err, assert_ok};

    fn service() -> DataService {
        DataService::new(Arc::new(MemoryStore::new()))
    }

    fn metadata() -> WebhookMetadata {
        WebhookMetadata {
            user_agent: Some("curl/8.0".into()),
            ip: Some("203.0.113.7".into()),
            referrer: "Direct".into(),
            received_at: Utc::now(),
        }
    }

    async fn webhook_dataset(service: &DataService, company: Uuid) -> Dataset {
        assert_ok!(
            service
                .create_dataset(
                    company,
                    CreateDatasetRequest {
                        name: "Signups".into(),
                        description: None,
                        dataset_type: DatasetType::Webhook,
                    },
                )
                .await
        )
    }

    #[test]
    fn test_record_page_validation() {
        let page = assert_ok!(record_page(&RecordQuery::default()));
        assert_eq!(page, RecordPage::default());

        let err = assert_err!(record_page(&RecordQuery {
            page: Some(0),
            limit: Some(101),
            ..Default::default()
        }));
        match err {
            ApiError::Validation(fields) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }

        let page = assert_ok!(record_page(&RecordQuery {
            page: Some(2),
            limit: Some(100),
            sort_by: Some(RecordSortField::UpdatedAt),
            sort_order: Some(SortOrder::Asc),
        }));
        assert_eq!(page.offset(), 100);
    }

    #[test]
    fn test_record_page_rejects_overflowing_offset() {
        let err = assert_err!(record_page(&RecordQuery {
            page: Some(i64::MAX),
            limit: Some(RecordPage::MAX_LIMIT),
            ..Default::default()
        }));
        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "page");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let page = assert_ok!(record_page(&RecordQuery {
            page: Some(i64::MAX / RecordPage::MAX_LIMIT),
            limit: Some(RecordPage::MAX_LIMIT),
            ..Default::default()
        }));
        assert!(page.offset() > 0);
    }

    #[tokio::test]
    async fn test_webhook_dataset_gets_credentials() {
        let service = service();
        let dataset = webhook_dataset(&service, Uuid::new_v4()).await;
        assert_eq!(dataset.webhook_id.as_deref().map(str::len), Some(32));
        assert_eq!(dataset.webhook_secret.as_deref().map(str::len), Some(64));
        assert_eq!(dataset.description, "");

        let manual = assert_ok!(
            service
                .create_dataset(
                    Uuid::new_v4(),
                    CreateDatasetRequest {
                        name: "Manual".into(),
                        description: Some("typed in".into()),
                        dataset_type: DatasetType::Manual,
                    },
                )
                .await
        );
        assert!(manual.webhook_id.is_none());
        assert!(manual.webhook_secret.is_none());
    }

    #[tokio::test]
    async fn test_webhook_ingestion() {
        let service = service();
        let company = Uuid::new_v4();
        let dataset = webhook_dataset(&service, company).await;
        let hook = dataset.webhook_id.clone().unwrap();
        let secret = dataset.webhook_secret.clone().unwrap();

        let err = assert_err!(
            service
                .ingest_webhook(&hook, None, json!({"a": 1}), metadata())
                .await
        );
        assert_eq!(err.to_string(), "Webhook secret is required");
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = assert_err!(
            service
                .ingest_webhook(&hook, Some("wrong"), json!({"a": 1}), metadata())
                .await
        );
        assert_eq!(err.to_string(), "Invalid webhook secret");
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = assert_err!(
            service
                .ingest_webhook("nope", Some(&secret), json!({"a": 1}), metadata())
                .await
        );
        assert_eq!(err.to_string(), "Invalid webhook ID");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let receipt = assert_ok!(
            service
                .ingest_webhook(&hook, Some(&secret), json!({"email": "x@y.z"}), metadata())
                .await
        );
        let (records, pagination) = assert_ok!(
            service
                .list_records(company, dataset.id, &RecordQuery::default())
                .await
        );
        assert_eq!(pagination.total, 1);
        assert_eq!(records[0].id, receipt.record_id);
        assert_eq!(records[0].data, json!({"email": "x@y.z"}));
        assert_eq!(records[0].metadata["referrer"], "Direct");
        assert_eq!(records[0].metadata["userAgent"], "curl/8.0");
    }

    #[tokio::test]
    async fn test_regenerate_secret_invalidates_old_one() {
        let service = service();
        let company = Uuid::new_v4();
        let dataset = webhook_dataset(&service, company).await;
        let hook = dataset.webhook_id.clone().unwrap();
        let old = dataset.webhook_secret.clone().unwrap();

        let updated = assert_ok!(service.regenerate_webhook_secret(company, dataset.id).await);
        let new = updated.webhook_secret.clone().unwrap();
        assert_ne!(old, new);
        assert_eq!(updated.webhook_id, dataset.webhook_id);

        let err = assert_err!(
            service
                .ingest_webhook(&hook, Some(&old), json!({}), metadata())
                .await
        );
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_ok!(
            service
                .ingest_webhook(&hook, Some(&new), json!({}), metadata())
                .await
        );
    }

    #[tokio::test]
    async fn test_regenerate_requires_webhook_dataset() {
        let service = service();
        let company = Uuid::new_v4();
        let dataset = assert_ok!(
            service
                .create_dataset(
                    company,
                    CreateDatasetRequest {
                        name: "Manual".into(),
                        description: None,
                        dataset_type: DatasetType::Manual,
                    },
                )
                .await
        );
        let err = assert_err!(service.regenerate_webhook_secret(company, dataset.id).await);
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.to_string(), "Dataset is not a webhook type");
    }

    #[tokio::test]
    async fn test_dataset_tenant_isolation() {
        let service = service();
        let company = Uuid::new_v4();
        let dataset = webhook_dataset(&service, company).await;

        let err = assert_err!(service.get_dataset(Uuid::new_v4(), dataset.id).await);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = assert_err!(service.get_dataset(company, Uuid::new_v4()).await);
        assert_eq!(err.to_string(), "Dataset not found");
        assert!(assert_ok!(service.list_datasets(Uuid::new_v4()).await).is_empty());
    }

    #[tokio::test]
    async fn test_add_record_and_update_keeps_name() {
        let service = service();
        let company = Uuid::new_v4();
        let user = Uuid::new_v4();
        let dataset = webhook_dataset(&service, company).await;

        let record = assert_ok!(
            service
                .add_record(company, user, dataset.id, json!({"score": 7}))
                .await
        );
        assert_eq!(record.metadata["source"], "manual");
        assert_eq!(record.metadata["addedBy"], json!(user));

        let updated = assert_ok!(
            service
                .update_dataset(
                    company,
                    dataset.id,
                    UpdateDatasetRequest {
                        name: Some("  ".into()),
                        description: Some("new".into()),
                    },
                )
                .await
        );
        assert_eq!(updated.name, "Signups");
        assert_eq!(updated.description, "new");
        assert_eq!(updated.record_count, 1);
    }

    #[tokio::test]
    async fn test_csv_import_creates_upload_dataset() {
        let service = service();
        let company = Uuid::new_v4();
        let summary = assert_ok!(
            service
                .import_file(
                    company,
                    "leads.csv",
                    b"name,email\nAda,ada@example.com\nAlan,alan@example.com\n",
                    ImportOptions::default(),
                )
                .await
        );
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.dataset.name, "Imported Data");
        assert_eq!(summary.dataset.description, "Data imported from file");
        assert_eq!(summary.dataset.dataset_type, DatasetType::Upload);
        assert_eq!(summary.dataset.record_count, 2);

        let (records, _) = assert_ok!(
            service
                .list_records(company, summary.dataset.id, &RecordQuery::default())
                .await
        );
        assert!(records
            .iter()
            .all(|r| r.metadata == json!({"source": "file_import"})));
    }

    #[tokio::test]
    async fn test_import_into_existing_dataset() {
        let service = service();
        let company = Uuid::new_v4();
        let dataset = webhook_dataset(&service, company).await;
        let summary = assert_ok!(
            service
                .import_file(
                    company,
                    "more.csv",
                    b"k\n1\n",
                    ImportOptions {
                        dataset_id: Some(dataset.id),
                        ..Default::default()
                    },
                )
                .await
        );
        assert_eq!(summary.dataset.id, dataset.id);
        assert_eq!(summary.imported, 1);

        let err = assert_err!(
            service
                .import_file(
                    Uuid::new_v4(),
                    "more.csv",
                    b"k\n1\n",
                    ImportOptions {
                        dataset_id: Some(dataset.id),
                        ..Default::default()
                    },
                )
                .await
        );
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_import_rejections() {
        let service = service();
        let company = Uuid::new_v4();
        let err = assert_err!(
            service
                .import_file(company, "empty.csv", b"name\n", ImportOptions::default())
                .await
        );
        assert_eq!(err.to_string(), "File contains no data");

        let err = assert_err!(
            service
                .import_file(company, "notes.txt", b"a\n1\n", ImportOptions::default())
                .await
        );
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(assert_ok!(service.list_datasets(company).await).is_empty());
    }
}
