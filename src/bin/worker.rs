use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use video_publisher::{
    config::AppConfig,
    db::{self, queries::PgJobLedger},
    services::{
        channel::ChannelRegistry, pipeline::Pipeline, queue::JobQueue, staging::StagingStore,
        storage::R2Client,
    },
};

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting video publish worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    let staging = Arc::new(
        StagingStore::new(&config.staging_dir, Arc::new(r2_client))
            .expect("Failed to initialize staging store"),
    );

    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));

    let channels = Arc::new(ChannelRegistry::from_webhooks(&config.channel_webhook_pairs()));

    let ledger = Arc::new(PgJobLedger::new(db_pool));

    let pipeline = Arc::new(Pipeline::new(ledger, staging.clone(), channels));

    // Periodic staging-directory reclamation, independent of any job
    let reclaim_interval = Duration::from_secs(config.reclaim_interval_secs);
    let reclaimer = staging.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reclaim_interval);
        loop {
            ticker.tick().await;
            match reclaimer.reclaim() {
                Ok(0) => tracing::debug!("reclaim sweep found nothing to remove"),
                Ok(count) => tracing::info!(count, "reclaimed stale staging files"),
                Err(e) => tracing::error!(error = %e, "staging reclaim sweep failed"),
            }
        }
    });

    // Queue depth gauge, sampled on its own cadence so it stays fresh
    // while the poll loop is busy dequeuing under load
    let depth_queue = queue.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            match depth_queue.queue_depth().await {
                Ok(depth) => metrics::gauge!("publish_queue_depth").set(depth as f64),
                Err(e) => tracing::debug!(error = %e, "failed to sample queue depth"),
            }
        }
    });

    let job_timeout = Duration::from_secs(config.job_timeout_secs);
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));

    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        job_timeout_secs = config.job_timeout_secs,
        "Worker ready, starting job processing loop"
    );

    // Main processing loop: one task per job, bounded by the semaphore
    loop {
        let job = match queue.dequeue().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error dequeuing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                continue;
            }
        };

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");

        let pipeline = pipeline.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            tracing::info!(
                job_id = %job.job_id,
                tenant_id = %job.tenant_id,
                channel = %job.channel,
                "Processing publish job"
            );

            // Deadline watchdog: cancellation ends the job as failed
            // ("cancelled:" category) rather than leaving it processing.
            let cancel = CancellationToken::new();
            let watchdog = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    sleep(job_timeout).await;
                    tracing::warn!("job deadline reached, cancelling");
                    cancel.cancel();
                })
            };

            let result = pipeline.run(&job, cancel).await;
            watchdog.abort();

            if let Err(e) = result {
                // Ledger-integrity failure: the job row could not be driven
                // to a terminal state from here.
                tracing::error!(job_id = %job.job_id, error = %e, "pipeline error");
            }

            if let Err(e) = queue.complete(&job).await {
                tracing::warn!(job_id = %job.job_id, error = %e, "failed to ack job in queue");
            }

            drop(permit);
        });
    }
}
