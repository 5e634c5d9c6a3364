use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{JobFilter, NewPublishJob, PublishJob};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Durable record store for publish jobs.
///
/// Every read and update is scoped by tenant: an id match alone is never
/// enough to touch a row, which is the cross-tenant isolation guarantee.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Insert a new pending job. `created_at`/`updated_at` are stamped
    /// server-side; fails with `DuplicateId` if the id already exists.
    async fn create(&self, new: &NewPublishJob) -> Result<PublishJob, LedgerError>;

    /// Full replace of the mutable fields (`status`, `result`, `error_msg`,
    /// `completed_at`) keyed by `(id, tenant_id)`. `updated_at` is bumped
    /// server-side. Fails with `NotFound` when no row matches both keys.
    async fn update(&self, job: &PublishJob) -> Result<(), LedgerError>;

    async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<PublishJob, LedgerError>;

    /// Filtered listing: present filter fields are AND-ed, absent fields
    /// are not applied. Results ordered by `created_at` descending with no
    /// implicit limit; pagination belongs to the caller.
    async fn find(
        &self,
        tenant_id: Uuid,
        filter: &JobFilter,
    ) -> Result<Vec<PublishJob>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("job id already exists")]
    DuplicateId,

    #[error("job not found")]
    NotFound,

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub mod queries;
