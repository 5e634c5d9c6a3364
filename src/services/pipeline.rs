use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::db::{JobLedger, LedgerError};
use crate::models::job::JobStatus;
use crate::services::channel::{ChannelError, ChannelRegistry, DeliveryMode, PublishArtifact, PublishMetadata};
use crate::services::queue::QueuedJob;
use crate::services::staging::{StagingError, StagingStore};

/// TTL for signed URLs handed to URL-delivery adapters.
const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Drives one publish job through acquisition, channel dispatch, and the
/// ledger transitions around them.
///
/// Acquisition and dispatch failures are recovered into a terminal failed
/// job; only ledger-integrity errors escape `run`, since they indicate a
/// caller or programming error rather than a job outcome.
pub struct Pipeline {
    ledger: Arc<dyn JobLedger>,
    staging: Arc<StagingStore>,
    channels: Arc<ChannelRegistry>,
}

/// Why a job ended failed. The Display form is the stable, categorized
/// `error_msg` prefix operators filter on.
enum JobFailure {
    Acquire(String),
    Publish(ChannelError),
    Cancelled,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Acquire(cause) => write!(f, "acquire: {cause}"),
            JobFailure::Publish(cause) => write!(f, "publish: {cause}"),
            JobFailure::Cancelled => write!(f, "cancelled: job aborted before completion"),
        }
    }
}

impl Pipeline {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        staging: Arc<StagingStore>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            ledger,
            staging,
            channels,
        }
    }

    /// Execute one queued job to a terminal state.
    ///
    /// The ledger is claimed (`pending` → `processing`) before any I/O, so
    /// a crash mid-job leaves a `processing` row that external reconciling
    /// can detect by `updated_at` staleness. Terminal states are never
    /// re-entered: a non-pending job is logged and skipped.
    pub async fn run(
        &self,
        queued: &QueuedJob,
        cancel: CancellationToken,
    ) -> Result<(), LedgerError> {
        let mut job = self.ledger.find_by_id(queued.tenant_id, queued.job_id).await?;

        if job.status != JobStatus::Pending {
            tracing::warn!(
                job_id = %job.id,
                status = job.status.as_str(),
                "skipping job not in pending state"
            );
            return Ok(());
        }

        // Optimistic claim before any I/O begins.
        job.begin_processing();
        self.ledger.update(&job).await?;

        let started = std::time::Instant::now();
        let outcome = self.execute(queued, &cancel).await;
        metrics::histogram!("publish_processing_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(reference) => {
                tracing::info!(
                    job_id = %job.id,
                    channel = %queued.channel,
                    reference = %reference,
                    "publish job succeeded"
                );
                metrics::counter!("publish_jobs_succeeded").increment(1);
                job.complete_success(reference);
            }
            Err(failure) => {
                let message = failure.to_string();
                tracing::error!(
                    job_id = %job.id,
                    channel = %queued.channel,
                    error = %message,
                    "publish job failed"
                );
                metrics::counter!("publish_jobs_failed").increment(1);
                job.complete_failure(message);
            }
        }

        self.ledger.update(&job).await
    }

    /// Acquisition and dispatch. Every error here is a job outcome, not a
    /// process fault.
    async fn execute(
        &self,
        queued: &QueuedJob,
        cancel: &CancellationToken,
    ) -> Result<String, JobFailure> {
        let adapter = self
            .channels
            .get(&queued.channel)
            .map_err(JobFailure::Publish)?;

        let artifact = match adapter.delivery() {
            DeliveryMode::LocalFile => {
                let path = self
                    .staging
                    .acquire(&queued.video_path, cancel)
                    .await
                    .map_err(|e| match e {
                        StagingError::Cancelled => JobFailure::Cancelled,
                        other => JobFailure::Acquire(other.to_string()),
                    })?;
                PublishArtifact::File(path)
            }
            DeliveryMode::SignedUrl => {
                // No local copy needed; the adapter fetches the asset itself.
                let url = self
                    .staging
                    .signed_url(&queued.video_path, SIGNED_URL_TTL)
                    .await
                    .map_err(|e| JobFailure::Acquire(e.to_string()))?;
                PublishArtifact::Url(url)
            }
        };

        let meta = PublishMetadata {
            tenant_id: queued.tenant_id,
            video_id: queued.video_id,
            nfc_card_id: queued.nfc_card_id,
            title: queued.title.clone(),
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(JobFailure::Cancelled),
            result = adapter.publish(&artifact, &meta) => result.map_err(JobFailure::Publish),
        }
    }
}
