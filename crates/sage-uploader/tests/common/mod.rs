//! Common test utilities for SAGE uploader integration tests
//!
//! - Staged upload directories in a temporary data directory
//! - MinIO (S3-compatible) container for the real uploader, via testcontainers
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{DataDir, TestMinio};
//!
//! #[tokio::test]
//! async fn test_with_minio() {
//!     let minio = TestMinio::start().await.expect("Failed to start MinIO");
//!     let data = DataDir::new();
//!     data.stage("node-a/uploads/plugin/1.0/cap1", b"payload", r#"{"ts": 1, "meta": {"filename": "a.txt"}}"#);
//!     // ...
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tracing::{debug, info};

use sage_uploader::target::{DATA_FILE, META_FILE, SENTINEL_FILE};
use sage_uploader::uploader::{S3Uploader, StorageConfig};

/// Default S3 bucket name for tests
pub const DEFAULT_TEST_BUCKET: &str = "sage-test-uploads";

const MINIO_ACCESS_KEY: &str = "minioadmin";
const MINIO_SECRET_KEY: &str = "minioadmin";

/// Initialize test logging
///
/// Call this at the start of a test to see tracing output.
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sage_uploader=debug,aws_smithy_runtime=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Temporary data directory holding staged uploads
pub struct DataDir {
    dir: TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp data dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute directory of a job
    pub fn job_dir(&self, job: &str) -> PathBuf {
        self.dir.path().join(job)
    }

    /// Stage a `data` payload and `meta` descriptor for `job`
    pub fn stage(&self, job: &str, data: &[u8], meta: &str) -> PathBuf {
        let dir = self.job_dir(job);
        std::fs::create_dir_all(&dir).expect("Failed to create job dir");
        std::fs::write(dir.join(DATA_FILE), data).expect("Failed to write data file");
        std::fs::write(dir.join(META_FILE), meta).expect("Failed to write meta file");
        dir
    }

    pub fn is_finalized(&self, job: &str) -> bool {
        self.job_dir(job).join(SENTINEL_FILE).exists()
    }
}

/// MinIO test container with a bucket already created
pub struct TestMinio {
    container: ContainerAsync<GenericImage>,
    client: S3Client,
    endpoint: String,
    bucket: String,
}

impl TestMinio {
    pub async fn start() -> Result<Self> {
        info!("Starting MinIO test container...");

        let container = GenericImage::new("minio/minio", "latest")
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("MinIO Object Storage Server"))
            .with_env_var("MINIO_ROOT_USER", MINIO_ACCESS_KEY)
            .with_env_var("MINIO_ROOT_PASSWORD", MINIO_SECRET_KEY)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .context("Failed to start MinIO container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get MinIO host")?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .context("Failed to get MinIO port")?;

        let endpoint = format!("http://{}:{}", host, port);
        debug!("MinIO endpoint: {}", endpoint);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(aws_credential_types::Credentials::new(
                MINIO_ACCESS_KEY,
                MINIO_SECRET_KEY,
                None,
                None,
                "static",
            ))
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        let client = S3Client::from_conf(s3_config);

        info!("Creating test bucket: {}", DEFAULT_TEST_BUCKET);
        client
            .create_bucket()
            .bucket(DEFAULT_TEST_BUCKET)
            .send()
            .await
            .context("Failed to create S3 bucket")?;

        Ok(Self {
            container,
            client,
            endpoint,
            bucket: DEFAULT_TEST_BUCKET.to_string(),
        })
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::for_minio(&self.endpoint, &self.bucket, MINIO_ACCESS_KEY, MINIO_SECRET_KEY)
    }

    /// Uploader pointed at this container
    pub async fn uploader(&self) -> Result<S3Uploader> {
        S3Uploader::new(self.storage_config()).await
    }

    /// Upload bytes directly, bypassing the uploader
    pub async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.into())
            .send()
            .await
            .context("Failed to upload to S3")?;
        Ok(())
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to download from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes();

        Ok(bytes.to_vec())
    }

    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .context("Failed to list S3 objects")?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(String::from))
            .collect())
    }
}
