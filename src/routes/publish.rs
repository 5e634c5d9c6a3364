use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::LedgerError;
use crate::models::api::{JobResponse, ListJobsQuery, PublishRequest, TenantQuery};
use crate::models::job::NewPublishJob;
use crate::services::queue::QueuedJob;
use crate::services::source;

/// POST /api/v1/publish — Create a publish job and dispatch it.
pub async fn create_publish_job(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<(StatusCode, Json<JobResponse>), StatusCode> {
    // Reject unroutable requests before writing anything
    if source::classify(&req.video_path).is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !state.channels.contains(&req.channel) {
        tracing::warn!(channel = %req.channel, "publish request for unknown channel");
        return Err(StatusCode::BAD_REQUEST);
    }

    let new = NewPublishJob {
        id: Uuid::new_v4(),
        tenant_id: req.tenant_id,
        video_id: req.video_id,
        nfc_card_id: req.nfc_card_id,
        channel: req.channel.clone(),
        video_path: req.video_path,
    };

    let job = state.ledger.create(&new).await.map_err(|e| match e {
        LedgerError::DuplicateId => StatusCode::CONFLICT,
        other => {
            tracing::error!(error = %other, "failed to create publish job");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    let queued = QueuedJob {
        job_id: job.id,
        tenant_id: job.tenant_id,
        video_id: job.video_id,
        nfc_card_id: job.nfc_card_id,
        channel: job.channel.clone(),
        // The ledger row is the durable record of the asset; the queue
        // payload is derived from it, not the other way around.
        video_path: job.video_path.clone(),
        title: req.title,
    };

    if let Err(e) = state.queue.enqueue(&queued).await {
        // The pending row stays behind for reconciliation tooling to re-dispatch
        tracing::error!(job_id = %job.id, error = %e, "failed to enqueue publish job");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    metrics::counter!("publish_jobs_total").increment(1);
    tracing::info!(
        job_id = %job.id,
        tenant_id = %job.tenant_id,
        channel = %job.channel,
        "publish job created"
    );

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// GET /api/v1/publish/{job_id} — Fetch one job, tenant-scoped.
pub async fn get_publish_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<JobResponse>, StatusCode> {
    let job = state
        .ledger
        .find_by_id(query.tenant_id, job_id)
        .await
        .map_err(|e| match e {
            LedgerError::NotFound => StatusCode::NOT_FOUND,
            other => {
                tracing::error!(job_id = %job_id, error = %other, "failed to load publish job");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok(Json(job.into()))
}

/// GET /api/v1/publish — List a tenant's jobs, newest first, with optional
/// status/video/card/channel filters.
pub async fn list_publish_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobResponse>>, StatusCode> {
    let jobs = state
        .ledger
        .find(query.tenant_id, &query.filter())
        .await
        .map_err(|e| match e {
            LedgerError::InvalidFilter(reason) => {
                tracing::debug!(reason, "rejected job listing filter");
                StatusCode::BAD_REQUEST
            }
            other => {
                tracing::error!(error = %other, "failed to list publish jobs");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}
