use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{ConnectInfo, State};
use axum::http::header::{REFERER, USER_AGENT};
use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use super::service::DataService;
use super::types::{
    CreateDatasetRequest, DataRecord, Dataset, ImportOptions, ImportSummary, RecordQuery,
    UpdateDatasetRequest, WebhookMetadata, WebhookReceipt,
};
use crate::core::middleware::AuthenticatedUser;
use crate::core::shared::utils::forwarded_client_ip;
use crate::core::shared::{
    ApiError, ApiResponse, ApiResult, AppState, JsonBody, PathParams, QueryParams,
};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

fn service(state: &AppState) -> DataService {
    DataService::new(state.datasets.clone())
}

fn upload_limit_label(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{bytes} bytes")
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn list_datasets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<ApiResponse<Vec<Dataset>>> {
    let datasets = service(&state).list_datasets(user.company_id).await?;
    Ok(ApiResponse::ok(datasets))
}

pub async fn create_dataset(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    JsonBody(req): JsonBody<CreateDatasetRequest>,
) -> ApiResult<ApiResponse<Dataset>> {
    let dataset = service(&state).create_dataset(user.company_id, req).await?;
    Ok(ApiResponse::created(dataset).with_message("Dataset created successfully"))
}

pub async fn get_dataset(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Dataset>> {
    let dataset = service(&state).get_dataset(user.company_id, id).await?;
    Ok(ApiResponse::ok(dataset))
}

pub async fn update_dataset(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(req): JsonBody<UpdateDatasetRequest>,
) -> ApiResult<ApiResponse<Dataset>> {
    let dataset = service(&state)
        .update_dataset(user.company_id, id, req)
        .await?;
    Ok(ApiResponse::ok(dataset).with_message("Dataset updated successfully"))
}

pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    service(&state).delete_dataset(user.company_id, id).await?;
    Ok(ApiResponse::message("Dataset deleted successfully"))
}

pub async fn regenerate_webhook_secret(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
) -> ApiResult<ApiResponse<Dataset>> {
    let dataset = service(&state)
        .regenerate_webhook_secret(user.company_id, id)
        .await?;
    Ok(ApiResponse::ok(dataset).with_message("Webhook secret regenerated"))
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    QueryParams(query): QueryParams<RecordQuery>,
) -> ApiResult<ApiResponse<Vec<DataRecord>>> {
    let (records, pagination) = service(&state)
        .list_records(user.company_id, id, &query)
        .await?;
    Ok(ApiResponse::ok(records).with_pagination(pagination))
}

pub async fn add_record(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(data): JsonBody<Value>,
) -> ApiResult<ApiResponse<DataRecord>> {
    let record = service(&state)
        .add_record(user.company_id, user.user_id, id, data)
        .await?;
    Ok(ApiResponse::created(record).with_message("Record added successfully"))
}

pub async fn import_data(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ApiResponse<ImportSummary>> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut options = ImportOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                let max = state.config.import.max_upload_bytes;
                if bytes.len() > max {
                    return Err(ApiError::BadRequest(format!(
                        "File exceeds the {} limit",
                        upload_limit_label(max)
                    )));
                }
                file = Some((filename, bytes.to_vec()));
            }
            "datasetId" | "name" | "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match name.as_str() {
                    "datasetId" => {
                        let id = Uuid::parse_str(text).map_err(|_| {
                            ApiError::validation("datasetId", "Dataset ID must be a UUID")
                        })?;
                        options.dataset_id = Some(id);
                    }
                    "name" => options.name = Some(text.to_string()),
                    _ => options.description = Some(text.to_string()),
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    let summary = service(&state)
        .import_file(user.company_id, &filename, &bytes, options)
        .await?;
    Ok(ApiResponse::created(summary).with_message("Data imported successfully"))
}

/// Unauthenticated ingestion endpoint; the dataset's secret travels in the
/// `x-webhook-secret` header.
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    PathParams(webhook_id): PathParams<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<Value>,
) -> ApiResult<ApiResponse<WebhookReceipt>> {
    let ip = header_str(&headers, "x-forwarded-for")
        .and_then(forwarded_client_ip)
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()));
    let referrer = header_str(&headers, REFERER.as_str())
        .or_else(|| header_str(&headers, "referrer"))
        .unwrap_or("Direct")
        .to_string();

    let metadata = WebhookMetadata {
        user_agent: header_str(&headers, USER_AGENT.as_str()).map(str::to_string),
        ip,
        referrer,
        received_at: Utc::now(),
    };

    let receipt = service(&state)
        .ingest_webhook(
            &webhook_id,
            header_str(&headers, WEBHOOK_SECRET_HEADER),
            payload,
            metadata,
        )
        .await?;
    Ok(ApiResponse::created(receipt).with_message("Data received successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_limit_label() {
        assert_eq!(upload_limit_label(10 * 1024 * 1024), "10MB");
        assert_eq!(upload_limit_label(2048), "2KB");
        assert_eq!(upload_limit_label(1500), "1500 bytes");
    }
}
