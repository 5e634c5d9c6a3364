//! Orchestrator scenarios against an in-memory ledger and mock channel
//! adapters. Only the staging store touches real I/O, via a local HTTP
//! server and a temp directory, so these run without external services.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use video_publisher::db::{JobLedger, LedgerError};
use video_publisher::models::job::{JobFilter, JobStatus, NewPublishJob, PublishJob};
use video_publisher::services::channel::{
    ChannelAdapter, ChannelError, ChannelRegistry, DeliveryMode, PublishArtifact, PublishMetadata,
};
use video_publisher::services::pipeline::Pipeline;
use video_publisher::services::queue::QueuedJob;
use video_publisher::services::staging::StagingStore;
use video_publisher::services::storage::R2Client;

// ---------------------------------------------------------------------------
// In-memory ledger

#[derive(Default)]
struct InMemoryLedger {
    jobs: Mutex<HashMap<(Uuid, Uuid), PublishJob>>,
}

#[async_trait]
impl JobLedger for InMemoryLedger {
    async fn create(&self, new: &NewPublishJob) -> Result<PublishJob, LedgerError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.keys().any(|(_, id)| *id == new.id) {
            return Err(LedgerError::DuplicateId);
        }
        let now = Utc::now();
        let job = PublishJob {
            id: new.id,
            tenant_id: new.tenant_id,
            video_id: new.video_id,
            nfc_card_id: new.nfc_card_id,
            channel: new.channel.clone(),
            video_path: new.video_path.clone(),
            status: JobStatus::Pending,
            result: None,
            error_msg: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        jobs.insert((new.tenant_id, new.id), job.clone());
        Ok(job)
    }

    async fn update(&self, job: &PublishJob) -> Result<(), LedgerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let stored = jobs
            .get_mut(&(job.tenant_id, job.id))
            .ok_or(LedgerError::NotFound)?;
        stored.status = job.status;
        stored.result = job.result.clone();
        stored.error_msg = job.error_msg.clone();
        stored.completed_at = job.completed_at;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<PublishJob, LedgerError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&(tenant_id, id))
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    async fn find(
        &self,
        tenant_id: Uuid,
        filter: &JobFilter,
    ) -> Result<Vec<PublishJob>, LedgerError> {
        let status = match &filter.status {
            Some(s) => Some(
                JobStatus::parse(s)
                    .ok_or_else(|| LedgerError::InvalidFilter(format!("unknown status: {s}")))?,
            ),
            None => None,
        };
        let mut jobs: Vec<PublishJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .filter(|j| status.map_or(true, |s| j.status == s))
            .filter(|j| filter.channel.as_ref().map_or(true, |c| &j.channel == c))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

// ---------------------------------------------------------------------------
// Mock adapters

/// Adapter that wants a local file and records what it was handed.
struct FileAdapter {
    received: Mutex<Option<PublishArtifact>>,
}

#[async_trait]
impl ChannelAdapter for FileAdapter {
    fn name(&self) -> &str {
        "douyin"
    }

    fn delivery(&self) -> DeliveryMode {
        DeliveryMode::LocalFile
    }

    async fn publish(
        &self,
        artifact: &PublishArtifact,
        _meta: &PublishMetadata,
    ) -> Result<String, ChannelError> {
        *self.received.lock().unwrap() = Some(artifact.clone());
        Ok("post-777".to_string())
    }
}

/// Adapter that takes a URL and records it.
struct UrlAdapter {
    received: Mutex<Option<String>>,
}

#[async_trait]
impl ChannelAdapter for UrlAdapter {
    fn name(&self) -> &str {
        "douyin"
    }

    fn delivery(&self) -> DeliveryMode {
        DeliveryMode::SignedUrl
    }

    async fn publish(
        &self,
        artifact: &PublishArtifact,
        _meta: &PublishMetadata,
    ) -> Result<String, ChannelError> {
        match artifact {
            PublishArtifact::Url(url) => {
                *self.received.lock().unwrap() = Some(url.clone());
                Ok("post-888".to_string())
            }
            PublishArtifact::File(_) => Err(ChannelError::Rejected("expected url".to_string())),
        }
    }
}

/// Adapter whose platform refuses every publish.
struct RejectingAdapter;

#[async_trait]
impl ChannelAdapter for RejectingAdapter {
    fn name(&self) -> &str {
        "douyin"
    }

    fn delivery(&self) -> DeliveryMode {
        DeliveryMode::SignedUrl
    }

    async fn publish(
        &self,
        _artifact: &PublishArtifact,
        _meta: &PublishMetadata,
    ) -> Result<String, ChannelError> {
        Err(ChannelError::Rejected("daily quota exceeded".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness

struct Harness {
    ledger: Arc<InMemoryLedger>,
    pipeline: Pipeline,
    _staging_dir: tempfile::TempDir,
    staging_path: std::path::PathBuf,
}

fn staging_store(dir: &Path) -> Arc<StagingStore> {
    let storage = Arc::new(
        R2Client::new("test-bucket", "https://example.invalid", "test", "test")
            .expect("storage client"),
    );
    Arc::new(StagingStore::new(dir, storage).expect("staging store"))
}

fn harness(adapter: Arc<dyn ChannelAdapter>) -> Harness {
    let ledger = Arc::new(InMemoryLedger::default());
    let staging_dir = tempfile::tempdir().unwrap();
    let staging_path = staging_dir.path().to_path_buf();
    let mut registry = ChannelRegistry::new();
    registry.register(adapter);
    let pipeline = Pipeline::new(
        ledger.clone(),
        staging_store(&staging_path),
        Arc::new(registry),
    );
    Harness {
        ledger,
        pipeline,
        _staging_dir: staging_dir,
        staging_path,
    }
}

async fn create_pending(ledger: &InMemoryLedger, channel: &str, video_path: &str) -> PublishJob {
    ledger
        .create(&NewPublishJob {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            video_id: Uuid::new_v4(),
            nfc_card_id: Some(Uuid::new_v4()),
            channel: channel.to_string(),
            video_path: video_path.to_string(),
        })
        .await
        .unwrap()
}

/// Dispatch payload as the API builds it: derived from the ledger row.
fn queued(job: &PublishJob) -> QueuedJob {
    QueuedJob {
        job_id: job.id,
        tenant_id: job.tenant_id,
        video_id: job.video_id,
        nfc_card_id: job.nfc_card_id,
        channel: job.channel.clone(),
        video_path: job.video_path.clone(),
        title: Some("demo clip".to_string()),
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// The two invariants every terminal job must satisfy.
fn assert_terminal_invariants(job: &PublishJob) {
    assert_eq!(job.completed_at.is_some(), job.status.is_terminal());
    assert!(
        job.result.is_none() || job.error_msg.is_none(),
        "result and error_msg must never both be set"
    );
}

// ---------------------------------------------------------------------------
// Scenarios

#[tokio::test]
async fn local_file_publish_succeeds() {
    let adapter = Arc::new(FileAdapter {
        received: Mutex::new(None),
    });
    let h = harness(adapter.clone());

    let addr = serve(Router::new().route("/clip.mp4", get(|| async { "video payload" }))).await;
    let video_path = format!("http://{addr}/clip.mp4");
    let job = create_pending(&h.ledger, "douyin", &video_path).await;
    let q = queued(&job);

    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.result.as_deref(), Some("post-777"));
    assert!(stored.error_msg.is_none());
    // The ledger row records the asset the job published
    assert_eq!(stored.video_path, video_path);
    assert_terminal_invariants(&stored);

    // The adapter received the staged local file with the asset bytes
    match adapter.received.lock().unwrap().as_ref().unwrap() {
        PublishArtifact::File(path) => {
            assert_eq!(std::fs::read(path).unwrap(), b"video payload");
        }
        other => panic!("expected file artifact, got {other:?}"),
    };
}

#[tokio::test]
async fn acquisition_failure_ends_job_failed_with_acquire_category() {
    let h = harness(Arc::new(FileAdapter {
        received: Mutex::new(None),
    }));
    // Nothing listens here: the transfer fails before any channel call
    let unreachable = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let job =
        create_pending(&h.ledger, "douyin", &format!("http://{unreachable}/clip.mp4")).await;
    let q = queued(&job);

    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_msg.as_deref().unwrap().starts_with("acquire:"));
    assert!(stored.result.is_none());
    assert!(stored.completed_at.is_some());
    assert_terminal_invariants(&stored);

    // Round-trip cleanliness: the failed acquire left nothing staged
    assert_eq!(std::fs::read_dir(&h.staging_path).unwrap().count(), 0);
}

#[tokio::test]
async fn remote_error_status_is_an_acquire_failure() {
    let h = harness(Arc::new(FileAdapter {
        received: Mutex::new(None),
    }));
    let addr = serve(
        Router::new().route("/clip.mp4", get(|| async { StatusCode::INTERNAL_SERVER_ERROR })),
    )
    .await;
    let job = create_pending(&h.ledger, "douyin", &format!("http://{addr}/clip.mp4")).await;
    let q = queued(&job);

    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_msg.as_deref().unwrap().starts_with("acquire:"));
    assert_eq!(std::fs::read_dir(&h.staging_path).unwrap().count(), 0);
}

#[tokio::test]
async fn channel_rejection_ends_job_failed_with_publish_category() {
    let h = harness(Arc::new(RejectingAdapter));
    let job = create_pending(&h.ledger, "douyin", "https://cdn.example/v.mp4").await;
    let q = queued(&job);

    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    let msg = stored.error_msg.as_deref().unwrap();
    assert!(msg.starts_with("publish:"));
    assert!(msg.contains("daily quota exceeded"));
    assert_terminal_invariants(&stored);
}

#[tokio::test]
async fn url_delivery_passes_absolute_url_through_without_staging() {
    let adapter = Arc::new(UrlAdapter {
        received: Mutex::new(None),
    });
    let h = harness(adapter.clone());
    let job = create_pending(&h.ledger, "douyin", "https://cdn.example/v.mp4").await;
    let q = queued(&job);

    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.result.as_deref(), Some("post-888"));

    // Already-absolute URL: handed over unsigned and unchanged
    assert_eq!(
        adapter.received.lock().unwrap().as_deref(),
        Some("https://cdn.example/v.mp4")
    );
    // No local copy was staged for URL delivery
    assert_eq!(std::fs::read_dir(&h.staging_path).unwrap().count(), 0);
}

#[tokio::test]
async fn unknown_channel_fails_the_job() {
    let h = harness(Arc::new(UrlAdapter {
        received: Mutex::new(None),
    }));
    let job = create_pending(&h.ledger, "weibo", "https://cdn.example/v.mp4").await;
    let q = queued(&job);

    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    let msg = stored.error_msg.as_deref().unwrap();
    assert!(msg.starts_with("publish:"));
    assert!(msg.contains("weibo"));
}

#[tokio::test]
async fn cancellation_ends_job_failed_with_cancelled_category() {
    let h = harness(Arc::new(FileAdapter {
        received: Mutex::new(None),
    }));
    let job = create_pending(&h.ledger, "douyin", "https://cdn.example/v.mp4").await;
    let q = queued(&job);

    let cancel = CancellationToken::new();
    cancel.cancel();
    h.pipeline.run(&q, cancel).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_msg.as_deref().unwrap().starts_with("cancelled:"));
    assert!(stored.completed_at.is_some());
    assert_terminal_invariants(&stored);
}

#[tokio::test]
async fn terminal_jobs_are_never_reexecuted() {
    let adapter = Arc::new(FileAdapter {
        received: Mutex::new(None),
    });
    let h = harness(adapter.clone());
    let job = create_pending(&h.ledger, "douyin", "https://cdn.example/v.mp4").await;

    // Drive it to a terminal state once
    let mut terminal = job.clone();
    terminal.begin_processing();
    terminal.complete_success("post-1".to_string());
    h.ledger.update(&terminal).await.unwrap();

    // A replayed dispatch for the same job is a no-op
    let q = queued(&job);
    h.pipeline.run(&q, CancellationToken::new()).await.unwrap();

    let stored = h.ledger.find_by_id(job.tenant_id, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.result.as_deref(), Some("post-1"));
    assert!(adapter.received.lock().unwrap().is_none());
}

#[tokio::test]
async fn missing_job_surfaces_ledger_error() {
    let h = harness(Arc::new(FileAdapter {
        received: Mutex::new(None),
    }));

    let q = QueuedJob {
        job_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        video_id: Uuid::new_v4(),
        nfc_card_id: None,
        channel: "douyin".to_string(),
        video_path: "https://cdn.example/v.mp4".to_string(),
        title: None,
    };

    let err = h.pipeline.run(&q, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound));
}
