//! Job error types
//!
//! Every failure inside a job attempt is one of these kinds. The worker logs it
//! with the job identifier and marks the job failed; it never takes the worker down.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::JobStage;
use crate::uploader::UploadError;

/// Result type alias for job processing
pub type JobResult<T> = std::result::Result<T, JobError>;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("could not parse job path {path} ({segments} segments)")]
    MalformedPath { path: String, segments: usize },

    #[error("metadata descriptor is not valid JSON: {0}")]
    MetadataParse(#[from] serde_json::Error),

    #[error("metadata field {field} is missing")]
    MissingField { field: &'static str },

    #[error("metadata field {field} is not a string")]
    TypeMismatch { field: &'static str },

    #[error("metadata field {field} is empty")]
    EmptyField { field: &'static str },

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("local IO error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JobError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Pipeline stage that this error terminates
    pub fn stage(&self) -> JobStage {
        match self {
            JobError::MalformedPath { .. } => JobStage::Parsing,
            JobError::MetadataParse(_)
            | JobError::MissingField { .. }
            | JobError::TypeMismatch { .. }
            | JobError::EmptyField { .. } => JobStage::Normalizing,
            JobError::Upload(_) => JobStage::Uploading,
            // descriptor reads happen while normalizing; finalization IO errors
            // never surface as a JobError
            JobError::LocalIo { .. } => JobStage::Normalizing,
        }
    }
}
