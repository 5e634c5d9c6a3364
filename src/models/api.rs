use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobFilter, JobStatus, PublishJob};

/// POST /api/v1/publish request body.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub tenant_id: Uuid,
    pub video_id: Uuid,
    /// Object-storage key or absolute URL of the source video.
    pub video_path: String,
    pub channel: String,
    pub nfc_card_id: Option<Uuid>,
    pub title: Option<String>,
}

/// Tenant scope for single-job lookups.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

/// Query parameters for GET /api/v1/publish.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub tenant_id: Uuid,
    pub status: Option<String>,
    pub video_id: Option<String>,
    pub nfc_card_id: Option<String>,
    pub channel: Option<String>,
}

impl ListJobsQuery {
    pub fn filter(&self) -> JobFilter {
        JobFilter {
            status: self.status.clone(),
            video_id: self.video_id.clone(),
            nfc_card_id: self.nfc_card_id.clone(),
            channel: self.channel.clone(),
        }
    }
}

/// Job representation returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub video_id: Uuid,
    pub nfc_card_id: Option<Uuid>,
    pub channel: String,
    pub video_path: String,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PublishJob> for JobResponse {
    fn from(job: PublishJob) -> Self {
        Self {
            id: job.id,
            tenant_id: job.tenant_id,
            video_id: job.video_id,
            nfc_card_id: job.nfc_card_id,
            channel: job.channel,
            video_path: job.video_path,
            status: job.status,
            result: job.result,
            error: job.error_msg,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}
