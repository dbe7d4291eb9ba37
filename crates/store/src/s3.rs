//! S3 implementation of ArtifactStore.

use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;

use audit_gate_core::{config::StorageConfig, traits::ArtifactStore, Error, Result};

/// S3-compatible storage for result artifacts.
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl S3ArtifactStore {
    /// Create a store from the ambient AWS configuration, optionally
    /// pointed at a custom endpoint.
    pub async fn new(bucket: &str, endpoint: Option<&str>, public_base_url: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(endpoint.is_some())
            .build();

        Self::new_with_client(Client::from_conf(s3_config), bucket, public_base_url)
    }

    /// Build from the `storage` config section; `None` when no bucket is set.
    pub async fn from_config(config: &StorageConfig) -> Option<Self> {
        let bucket = config.s3_bucket.as_deref()?;
        Some(Self::new(bucket, config.s3_endpoint.as_deref(), config.public_base_url.clone()).await)
    }

    /// Create with custom client (for testing/custom config).
    pub fn new_with_client(client: Client, bucket: &str, public_base_url: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            public_base_url,
        }
    }

    fn url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("s3://{}/{}", self.bucket, key),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, key: &str, blob: Bytes) -> Result<String> {
        let size = blob.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(blob))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| Error::storage(format!("S3 upload error: {}", e)))?;

        tracing::debug!(bucket = %self.bucket, key = %key, size, "Artifact uploaded");
        Ok(self.url(key))
    }
}
