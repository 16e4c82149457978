//! Remote write capability
//!
//! The pipeline only ever talks to an [`Uploader`]. Which variant backs it is
//! decided once from configuration by [`build_uploader`]:
//!
//! - [`S3Uploader`]: the production object store
//! - [`RecordingUploader`]: in-memory store for tests and dry runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, UploadBackend};

pub mod config;
pub mod recording;
pub mod s3;

pub use config::StorageConfig;
pub use recording::{RecordedObject, RecordingUploader};
pub use s3::S3Uploader;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("remote store request for {key} failed: {message}")]
    Remote {
        key: String,
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("upload of {key} rejected: {reason}")]
    Rejected { key: String, reason: String },
}

impl UploadError {
    pub(crate) fn local_read(path: &Path, source: impl Into<BoxError>) -> Self {
        UploadError::LocalRead {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

/// Write access to the remote object store
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// True when a listing of `prefix` capped at two keys returns two (data and
    /// sidecar). A single object is an interrupted upload and reads as absent.
    async fn exists(&self, prefix: &str) -> bool;

    /// Upload `local_path` to `remote_key` with `metadata` attached as object
    /// metadata, returning the object location.
    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, UploadError>;
}

/// Build the uploader selected by `config.backend`
pub async fn build_uploader(config: &Config) -> anyhow::Result<Arc<dyn Uploader>> {
    let uploader: Arc<dyn Uploader> = match config.backend {
        UploadBackend::S3 => Arc::new(S3Uploader::new(config.storage.clone()).await?),
        UploadBackend::Recording => Arc::new(RecordingUploader::new()),
    };

    tracing::info!(backend = uploader.backend(), "Uploader initialized");

    Ok(uploader)
}
