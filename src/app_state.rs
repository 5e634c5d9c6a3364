use sqlx::PgPool;
use std::sync::Arc;

use crate::db::JobLedger;
use crate::services::{channel::ChannelRegistry, queue::JobQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub ledger: Arc<dyn JobLedger>,
    pub queue: Arc<JobQueue>,
    pub channels: Arc<ChannelRegistry>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        ledger: Arc<dyn JobLedger>,
        queue: JobQueue,
        channels: ChannelRegistry,
    ) -> Self {
        Self {
            db,
            ledger,
            queue: Arc::new(queue),
            channels: Arc::new(channels),
        }
    }
}
