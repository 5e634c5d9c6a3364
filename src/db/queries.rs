use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::{JobLedger, LedgerError};
use crate::models::job::{JobFilter, JobStatus, NewPublishJob, PublishJob};

const JOB_COLUMNS: &str = "id, tenant_id, video_id, nfc_card_id, channel, video_path, status, \
                           result, error_msg, created_at, updated_at, completed_at";

/// PostgreSQL-backed job ledger.
pub struct PgJobLedger {
    pool: PgPool,
}

impl PgJobLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLedger for PgJobLedger {
    async fn create(&self, new: &NewPublishJob) -> Result<PublishJob, LedgerError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO publish_jobs (id, tenant_id, video_id, nfc_card_id, channel, video_path)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(new.id)
        .bind(new.tenant_id)
        .bind(new.video_id)
        .bind(new.nfc_card_id)
        .bind(&new.channel)
        .bind(&new.video_path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::DuplicateId,
            _ => LedgerError::Db(e),
        })?;

        job_from_row(&row)
    }

    async fn update(&self, job: &PublishJob) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = $1,
                result = $2,
                error_msg = $3,
                completed_at = $4,
                updated_at = NOW()
            WHERE id = $5 AND tenant_id = $6
            "#,
        )
        .bind(job.status.as_str())
        .bind(&job.result)
        .bind(&job.error_msg)
        .bind(job.completed_at)
        .bind(job.id)
        .bind(job.tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<PublishJob, LedgerError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM publish_jobs
            WHERE id = $1 AND tenant_id = $2
            "#,
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => job_from_row(&r),
            None => Err(LedgerError::NotFound),
        }
    }

    async fn find(
        &self,
        tenant_id: Uuid,
        filter: &JobFilter,
    ) -> Result<Vec<PublishJob>, LedgerError> {
        let status = parse_status_filter(&filter.status)?;
        let video_id = parse_uuid_filter(&filter.video_id, "video_id")?;
        let nfc_card_id = parse_uuid_filter(&filter.nfc_card_id, "nfc_card_id")?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM publish_jobs
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR video_id = $3)
              AND ($4::uuid IS NULL OR nfc_card_id = $4)
              AND ($5::text IS NULL OR channel = $5)
            ORDER BY created_at DESC
            "#,
        ))
        .bind(tenant_id)
        .bind(status.map(|s| s.as_str()))
        .bind(video_id)
        .bind(nfc_card_id)
        .bind(&filter.channel)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }
}

fn parse_status_filter(value: &Option<String>) -> Result<Option<JobStatus>, LedgerError> {
    match value {
        Some(raw) => JobStatus::parse(raw)
            .map(Some)
            .ok_or_else(|| LedgerError::InvalidFilter(format!("unknown status: {raw}"))),
        None => Ok(None),
    }
}

fn parse_uuid_filter(value: &Option<String>, field: &str) -> Result<Option<Uuid>, LedgerError> {
    match value {
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| LedgerError::InvalidFilter(format!("{field} is not a valid uuid"))),
        None => Ok(None),
    }
}

fn job_from_row(row: &PgRow) -> Result<PublishJob, LedgerError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        LedgerError::Db(sqlx::Error::Decode(
            format!("unknown job status in row: {status_str}").into(),
        ))
    })?;

    Ok(PublishJob {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        video_id: row.try_get("video_id")?,
        nfc_card_id: row.try_get("nfc_card_id")?,
        channel: row.try_get("channel")?,
        video_path: row.try_get("video_path")?,
        status,
        result: row.try_get("result")?,
        error_msg: row.try_get("error_msg")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
