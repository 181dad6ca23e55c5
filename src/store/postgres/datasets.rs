use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{DatasetRow, RecordRow};
use super::PgStore;
use crate::core::shared::schema::{data_records, datasets};
use crate::engage::data::types::{
    DataRecord, Dataset, RecordPage, RecordSortField, SortOrder, UpdateDatasetRequest,
};
use crate::store::{DatasetStore, NewDataset, NewRecord, StoreError, StoreResult};

fn not_found() -> StoreError {
    StoreError::NotFound("Dataset".to_string())
}

fn count_records(conn: &mut PgConnection, dataset_id: Uuid) -> StoreResult<i64> {
    Ok(data_records::table
        .filter(data_records::dataset_id.eq(dataset_id))
        .count()
        .get_result(conn)?)
}

fn with_count(conn: &mut PgConnection, row: DatasetRow) -> StoreResult<Dataset> {
    let count = count_records(conn, row.id)?;
    row.into_dataset(count)
}

#[async_trait]
impl DatasetStore for PgStore {
    async fn list_datasets(&self, company_id: Uuid) -> StoreResult<Vec<Dataset>> {
        self.run(move |conn| {
            let rows: Vec<DatasetRow> = datasets::table
                .filter(datasets::company_id.eq(company_id))
                .order(datasets::updated_at.desc())
                .select(DatasetRow::as_select())
                .load(conn)?;

            let ids: Vec<Uuid> = rows.iter().map(|d| d.id).collect();
            let counts: HashMap<Uuid, i64> = data_records::table
                .filter(data_records::dataset_id.eq_any(&ids))
                .group_by(data_records::dataset_id)
                .select((data_records::dataset_id, diesel::dsl::count_star()))
                .load::<(Uuid, i64)>(conn)?
                .into_iter()
                .collect();

            rows.into_iter()
                .map(|row| {
                    let count = counts.get(&row.id).copied().unwrap_or(0);
                    row.into_dataset(count)
                })
                .collect()
        })
        .await
    }

    async fn get_dataset(&self, id: Uuid) -> StoreResult<Option<Dataset>> {
        self.run(move |conn| {
            let row: Option<DatasetRow> = datasets::table
                .find(id)
                .select(DatasetRow::as_select())
                .first(conn)
                .optional()?;
            row.map(|row| with_count(conn, row)).transpose()
        })
        .await
    }

    async fn find_by_webhook_id(&self, webhook_id: &str) -> StoreResult<Option<Dataset>> {
        let webhook_id = webhook_id.to_string();
        self.run(move |conn| {
            let row: Option<DatasetRow> = datasets::table
                .filter(datasets::webhook_id.eq(webhook_id))
                .select(DatasetRow::as_select())
                .first(conn)
                .optional()?;
            row.map(|row| with_count(conn, row)).transpose()
        })
        .await
    }

    async fn insert_dataset(&self, new: NewDataset) -> StoreResult<Dataset> {
        self.run(move |conn| {
            let now = Utc::now();
            let row = DatasetRow {
                id: Uuid::new_v4(),
                company_id: new.company_id,
                name: new.name,
                description: new.description.unwrap_or_default(),
                dataset_type: new.dataset_type.as_str().to_string(),
                webhook_id: new.webhook_id,
                webhook_secret: new.webhook_secret,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(datasets::table)
                .values(&row)
                .execute(conn)?;
            row.into_dataset(0)
        })
        .await
    }

    async fn update_dataset(&self, id: Uuid, patch: UpdateDatasetRequest) -> StoreResult<Dataset> {
        self.run(move |conn| {
            let row: DatasetRow = diesel::update(datasets::table.find(id))
                .set((
                    patch
                        .name
                        .filter(|n| !n.is_empty())
                        .map(|n| datasets::name.eq(n)),
                    patch.description.map(|d| datasets::description.eq(d)),
                    datasets::updated_at.eq(Utc::now()),
                ))
                .returning(DatasetRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(not_found)?;
            with_count(conn, row)
        })
        .await
    }

    async fn set_webhook_secret(&self, id: Uuid, secret: String) -> StoreResult<Dataset> {
        self.run(move |conn| {
            let row: DatasetRow = diesel::update(datasets::table.find(id))
                .set((
                    datasets::webhook_secret.eq(Some(secret)),
                    datasets::updated_at.eq(Utc::now()),
                ))
                .returning(DatasetRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(not_found)?;
            with_count(conn, row)
        })
        .await
    }

    async fn delete_dataset(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                diesel::delete(data_records::table.filter(data_records::dataset_id.eq(id)))
                    .execute(conn)?;
                let deleted = diesel::delete(datasets::table.find(id)).execute(conn)?;
                if deleted == 0 {
                    return Err(not_found());
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_records(&self, dataset_id: Uuid, page: RecordPage) -> StoreResult<(Vec<DataRecord>, i64)> {
        self.run(move |conn| {
            let total = count_records(conn, dataset_id)?;

            let query = data_records::table
                .filter(data_records::dataset_id.eq(dataset_id))
                .select(RecordRow::as_select())
                .into_boxed();
            let query = match (page.sort_by, page.sort_order) {
                (RecordSortField::CreatedAt, SortOrder::Asc) => {
                    query.order((data_records::created_at.asc(), data_records::id.asc()))
                }
                (RecordSortField::CreatedAt, SortOrder::Desc) => {
                    query.order((data_records::created_at.desc(), data_records::id.asc()))
                }
                (RecordSortField::UpdatedAt, SortOrder::Asc) => {
                    query.order((data_records::updated_at.asc(), data_records::id.asc()))
                }
                (RecordSortField::UpdatedAt, SortOrder::Desc) => {
                    query.order((data_records::updated_at.desc(), data_records::id.asc()))
                }
            };

            let rows: Vec<RecordRow> = query
                .offset(page.offset())
                .limit(page.limit)
                .load(conn)?;
            Ok((rows.into_iter().map(DataRecord::from).collect(), total))
        })
        .await
    }

    async fn insert_record(&self, dataset_id: Uuid, record: NewRecord) -> StoreResult<DataRecord> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                let now = Utc::now();
                let touched = diesel::update(datasets::table.find(dataset_id))
                    .set(datasets::updated_at.eq(now))
                    .execute(conn)?;
                if touched == 0 {
                    return Err(not_found());
                }

                let row = RecordRow {
                    id: Uuid::new_v4(),
                    dataset_id,
                    data: record.data,
                    metadata: record.metadata,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(data_records::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(DataRecord::from(row))
            })
        })
        .await
    }
}
