mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use db::queries::PgJobLedger;
use services::{channel::ChannelRegistry, queue::JobQueue};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing video-publisher API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("publish_jobs_total", "Total publish jobs submitted");
    metrics::describe_counter!(
        "publish_jobs_succeeded",
        "Total publish jobs that reached the channel"
    );
    metrics::describe_counter!("publish_jobs_failed", "Total publish jobs that failed");
    metrics::describe_gauge!(
        "publish_queue_depth",
        "Current number of pending jobs in the dispatch queue"
    );
    metrics::describe_histogram!(
        "publish_processing_seconds",
        "Time from claim to terminal state for a publish job"
    );
    metrics::describe_counter!(
        "staging_files_reclaimed",
        "Stale staging files removed by reclamation sweeps"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Build the channel adapter registry from configuration
    let channels = ChannelRegistry::from_webhooks(&config.channel_webhook_pairs());

    // Create shared application state
    let ledger = Arc::new(PgJobLedger::new(db_pool.clone()));
    let state = AppState::new(db_pool, ledger, queue, channels);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/publish",
            post(routes::publish::create_publish_job).get(routes::publish::list_publish_jobs),
        )
        .route(
            "/api/v1/publish/{job_id}",
            get(routes::publish::get_publish_job),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024)); // JSON bodies only; videos never pass through here

    tracing::info!("Starting video-publisher on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
