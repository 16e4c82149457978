//! Per-job upload pipeline
//!
//! One attempt runs strictly in order:
//!
//! 1. parse the job path into provenance
//! 2. read and normalize the `meta` descriptor
//! 3. skip the upload when both objects are already in the store
//! 4. upload the data object, then the `.meta` sidecar
//! 5. finalize the local directory (delete it or drop a `done` file)
//!
//! The sidecar goes last so that its presence implies a complete data object.
//! An interrupted attempt leaves at most one object, which the existence check
//! treats as absent, so retrying converges.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{AgentConfig, CompletionAction};
use crate::error::{JobError, JobResult};
use crate::metadata::normalize;
use crate::provenance::ProvenanceInfo;
use crate::queue::Job;
use crate::target::{UploadTarget, META_FILE, SENTINEL_FILE};
use crate::uploader::Uploader;

/// Pipeline stage, reported alongside job errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Parsing,
    Normalizing,
    CheckingExistence,
    Uploading,
    Finalizing,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Parsing => "parsing",
            JobStage::Normalizing => "normalizing",
            JobStage::CheckingExistence => "checking_existence",
            JobStage::Uploading => "uploading",
            JobStage::Finalizing => "finalizing",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Both objects were written during this attempt
    Uploaded { location: String },
    /// The store already held both objects
    AlreadyComplete,
}

/// Result of a successful attempt
#[derive(Debug)]
pub struct JobReport {
    pub data_key: String,
    pub outcome: JobOutcome,
    /// Finalization failures do not fail the job; they are carried here
    pub finalize_error: Option<JobError>,
}

impl JobReport {
    pub fn was_skipped(&self) -> bool {
        self.outcome == JobOutcome::AlreadyComplete
    }
}

pub struct JobPipeline {
    data_dir: PathBuf,
    completion: CompletionAction,
    uploader: Arc<dyn Uploader>,
}

impl JobPipeline {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        completion: CompletionAction,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            completion,
            uploader,
        }
    }

    pub fn from_config(config: &AgentConfig, uploader: Arc<dyn Uploader>) -> Self {
        Self::new(config.data_dir.clone(), config.completion, uploader)
    }

    /// Absolute directory of `job`
    pub fn job_dir(&self, job: &Job) -> PathBuf {
        self.data_dir.join(job.as_str())
    }

    /// Run one attempt for `job`
    #[instrument(skip(self, job), fields(job = %job, backend = self.uploader.backend()))]
    pub async fn process(&self, job: &Job) -> JobResult<JobReport> {
        let provenance = ProvenanceInfo::parse(job.as_str())?;
        debug!(
            node = %provenance.node_id,
            plugin = %provenance.plugin_ref(),
            "Parsed job path"
        );

        let job_dir = self.job_dir(job);
        let target = self.prepare(&job_dir, &provenance).await?;
        let data_key = target.data_key();

        let outcome = if self.uploader.exists(&data_key).await {
            info!(key = %data_key, "Upload already present, skipping");
            JobOutcome::AlreadyComplete
        } else {
            self.upload(&target).await?
        };

        let finalize_error = self.finalize(&job_dir).await.err();
        if let Some(ref e) = finalize_error {
            warn!(
                stage = %JobStage::Finalizing,
                error = %e,
                "Failed to finalize upload directory"
            );
        }

        Ok(JobReport {
            data_key,
            outcome,
            finalize_error,
        })
    }

    async fn prepare(&self, job_dir: &Path, provenance: &ProvenanceInfo) -> JobResult<UploadTarget> {
        let meta_path = job_dir.join(META_FILE);
        let raw = tokio::fs::read(&meta_path)
            .await
            .map_err(|e| JobError::local_io(&meta_path, e))?;

        let metadata = normalize(&raw, provenance)?;
        let target = UploadTarget::build(job_dir, provenance, &metadata);

        debug!(
            prefix = %target.remote_prefix,
            data = %target.data_name,
            "Resolved upload target"
        );

        Ok(target)
    }

    async fn upload(&self, target: &UploadTarget) -> JobResult<JobOutcome> {
        let location = self
            .uploader
            .upload(&target.local_data_file, &target.data_key(), &target.metadata)
            .await?;

        // the sidecar carries no object metadata
        self.uploader
            .upload(&target.local_meta_file, &target.meta_key(), &HashMap::new())
            .await?;

        info!(%location, "Uploaded data and sidecar");

        Ok(JobOutcome::Uploaded { location })
    }

    async fn finalize(&self, job_dir: &Path) -> JobResult<()> {
        match self.completion {
            CompletionAction::Delete => {
                tokio::fs::remove_dir_all(job_dir)
                    .await
                    .map_err(|e| JobError::local_io(job_dir, e))?;
                debug!(dir = %job_dir.display(), "Removed upload directory");
            },
            CompletionAction::Sentinel => {
                let sentinel = job_dir.join(SENTINEL_FILE);
                tokio::fs::File::create(&sentinel)
                    .await
                    .map_err(|e| JobError::local_io(&sentinel, e))?;
                debug!(path = %sentinel.display(), "Wrote completion marker");
            },
        }

        Ok(())
    }
}
