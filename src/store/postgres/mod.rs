//! PostgreSQL adapter: diesel over an r2d2 pool. Every call checks out a
//! connection inside `spawn_blocking` so the async runtime never blocks on I/O.

mod crm;
mod datasets;
pub mod migration;
pub mod models;

use diesel::connection::SimpleConnection;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::PgConnection;
use log::info;

use super::{StoreError, StoreResult};
use crate::core::shared::utils::DbPool;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound("Record".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates missing tables. Safe to run on every start.
    pub fn migrate(&self) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        conn.batch_execute(migration::create_crm_tables_migration())?;
        conn.batch_execute(migration::create_dataset_tables_migration())?;
        info!("Database schema is up to date");
        Ok(())
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}
