use crate::{domain::FileStorage, errors::StorageError};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use tracing;

/// Shapes the public URL for a stored object. The rendering surfaces rely
/// on this exact form for image `src` values.
pub fn public_object_url(storage_base: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/object/public/{}/{}",
        storage_base.trim_end_matches('/'),
        bucket,
        path
    )
}

#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String) -> Self {
        Self { client, bucket_name }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data using PutObject. PutObject overwrites an existing key,
    /// which matches the caller-chosen-path, upsert-on-conflict contract.
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, StorageError> {
        let content_type = content_type
            .or_else(|| mime_guess::from_path(path).first_raw().map(|s| s.to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(object_path = %path, bucket = %self.bucket_name, %content_type, "S3: Uploading file");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(path)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{path}'"))
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        tracing::debug!(object_path = %path, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(path.to_string())
    }
}
