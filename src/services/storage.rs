use s3::creds::Credentials;
use s3::{Bucket, Region};
use tokio::io::AsyncWrite;

/// Client for S3-compatible object storage (Cloudflare R2).
pub struct R2Client {
    bucket: Box<Bucket>,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    /// Stream an object's bytes into the given writer.
    pub async fn download_to<W>(&self, key: &str, writer: &mut W) -> Result<(), StorageError>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let status = self
            .bucket
            .get_object_to_writer(key, writer)
            .await
            .map_err(StorageError::S3)?;

        if status != 200 {
            return Err(StorageError::Status(status));
        }
        Ok(())
    }

    /// Generate a time-limited signed GET URL for an object.
    pub async fn presign_get(&self, key: &str, expiry_secs: u32) -> Result<String, StorageError> {
        self.bucket
            .presign_get(key, expiry_secs, None)
            .await
            .map_err(StorageError::S3)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("storage returned status {0}")]
    Status(u16),

    #[error("storage configuration error: {0}")]
    Config(String),
}
