use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use sage_common::checksum::ContentDigest;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::{StorageConfig, UploadError, Uploader};

/// Uploader backed by an S3 compatible object store
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    bucket: String,
}

impl S3Uploader {
    pub async fn new(config: StorageConfig) -> anyhow::Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            "Initializing S3 uploader"
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = match config.static_credentials() {
            Some((access_key, secret_key)) => aws_sdk_s3::Config::builder()
                .credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "sage-uploader",
                ))
                .region(region),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        s3_config_builder = s3_config_builder.force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "S3 client initialized");

        Ok(Self::from_client(client, config.bucket))
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    fn backend(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self))]
    async fn exists(&self, prefix: &str) -> bool {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(2)
            .send()
            .await;

        match response {
            Ok(output) => {
                let count = output.contents().len();
                debug!(count, "Listed objects under prefix");
                count == 2
            },
            Err(e) => {
                // treated as absent; the upload that follows reports the real failure
                warn!(error = %DisplayErrorContext(&e), "Failed to list objects");
                false
            },
        }
    }

    #[instrument(skip(self, metadata), fields(bucket = %self.bucket))]
    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, UploadError> {
        let digest = ContentDigest::from_file(local_path)
            .await
            .map_err(|e| UploadError::local_read(local_path, e))?;

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| UploadError::local_read(local_path, e))?;

        debug!(content_md5 = %digest, "Uploading to s3://{}/{}", self.bucket, remote_key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(remote_key)
            .body(body)
            .content_md5(digest.to_base64());

        if !metadata.is_empty() {
            request = request.set_metadata(Some(metadata.clone()));
        }

        request.send().await.map_err(|e| UploadError::Remote {
            key: remote_key.to_string(),
            message: DisplayErrorContext(&e).to_string(),
            source: Box::new(e),
        })?;

        let location = self.location(remote_key);
        info!(%location, "Upload complete");

        Ok(location)
    }
}
