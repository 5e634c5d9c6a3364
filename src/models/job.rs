use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a publish job.
///
/// `Succeeded` and `Failed` are terminal: a job never transitions out of
/// them. Retrying a failed publish creates a new job record with a fresh
/// id, so every attempt stays in the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// One attempt to publish one video to one channel for one tenant.
///
/// Invariants: `completed_at` is set iff the status is terminal; `result`
/// is set only on success, `error_msg` only on failure, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub video_id: Uuid,
    pub nfc_card_id: Option<Uuid>,
    pub channel: String,
    /// Object-storage key or absolute URL of the source video. Persisted
    /// so a stale row can be re-dispatched as a new job without consulting
    /// anything outside the ledger.
    pub video_path: String,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PublishJob {
    /// Mark the job as claimed for execution.
    pub fn begin_processing(&mut self) {
        self.status = JobStatus::Processing;
    }

    /// Terminal success transition: records the channel's remote reference.
    pub fn complete_success(&mut self, reference: String) {
        self.status = JobStatus::Succeeded;
        self.result = Some(reference);
        self.error_msg = None;
        self.completed_at = Some(Utc::now());
    }

    /// Terminal failure transition: records a categorized diagnostic.
    pub fn complete_failure(&mut self, message: String) {
        self.status = JobStatus::Failed;
        self.error_msg = Some(message);
        self.result = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Fields supplied by the caller when creating a job; the ledger stamps
/// status and timestamps server-side.
#[derive(Debug, Clone)]
pub struct NewPublishJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub video_id: Uuid,
    pub nfc_card_id: Option<Uuid>,
    pub channel: String,
    pub video_path: String,
}

/// Optional conjunction of filters for job listing.
///
/// Fields are carried as raw strings from the query layer; absent fields
/// are not applied. Un-parseable uuid-shaped fields are rejected by the
/// ledger rather than silently matching nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<String>,
    pub video_id: Option<String>,
    pub nfc_card_id: Option<String>,
    pub channel: Option<String>,
}
