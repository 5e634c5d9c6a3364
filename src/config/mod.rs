use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for job queue
    pub redis_url: String,

    /// R2 bucket name holding tenant video assets
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Local directory where video assets are staged before upload
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Channel webhook endpoints, "name=url" pairs separated by commas,
    /// e.g. "douyin=https://pub.internal/douyin,kuaishou=https://pub.internal/ks"
    pub channel_webhooks: String,

    /// Maximum publish jobs executed concurrently by one worker
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Per-job deadline in seconds; cancellation marks the job failed
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Seconds between staging-directory reclamation sweeps
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_staging_dir() -> String {
    "./staging".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_reclaim_interval_secs() -> u64 {
    3600
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Parse `channel_webhooks` into (channel, endpoint) pairs. Malformed
    /// entries are skipped with a warning rather than failing startup.
    pub fn channel_webhook_pairs(&self) -> Vec<(String, String)> {
        self.channel_webhooks
            .split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }
                match entry.split_once('=') {
                    Some((name, url)) if !name.is_empty() && !url.is_empty() => {
                        Some((name.trim().to_string(), url.trim().to_string()))
                    }
                    _ => {
                        tracing::warn!(entry, "ignoring malformed channel webhook entry");
                        None
                    }
                }
            })
            .collect()
    }
}
