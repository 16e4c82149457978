use async_trait::async_trait;
use sage_common::checksum::ContentDigest;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{UploadError, Uploader};

/// Object held by a [`RecordingUploader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedObject {
    pub key: String,
    pub size: u64,
    pub content_md5: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
enum FailureRule {
    All(String),
    KeySuffix { suffix: String, reason: String },
}

impl FailureRule {
    fn reason_for(&self, key: &str) -> Option<&str> {
        match self {
            FailureRule::All(reason) => Some(reason.as_str()),
            FailureRule::KeySuffix { suffix, reason } if key.ends_with(suffix.as_str()) => {
                Some(reason.as_str())
            },
            FailureRule::KeySuffix { .. } => None,
        }
    }
}

/// In-memory object store.
///
/// Uploads read the local file (so missing payloads still fail) and record the
/// object under its key. Failures can be injected to simulate a transport
/// error or a crash between the data and sidecar uploads.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    objects: Mutex<BTreeMap<String, RecordedObject>>,
    failure: Mutex<Option<FailureRule>>,
    uploads: AtomicUsize,
    exists_checks: AtomicUsize,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every upload with `reason`
    pub async fn fail_all(&self, reason: impl Into<String>) {
        *self.failure.lock().await = Some(FailureRule::All(reason.into()));
    }

    /// Reject uploads whose key ends with `suffix`
    pub async fn fail_on_suffix(&self, suffix: impl Into<String>, reason: impl Into<String>) {
        *self.failure.lock().await = Some(FailureRule::KeySuffix {
            suffix: suffix.into(),
            reason: reason.into(),
        });
    }

    pub async fn clear_failure(&self) {
        *self.failure.lock().await = None;
    }

    /// Place an object directly, as if an earlier run had uploaded it
    pub async fn seed(&self, key: impl Into<String>) {
        let key = key.into();
        self.objects.lock().await.insert(
            key.clone(),
            RecordedObject {
                key,
                size: 0,
                content_md5: ContentDigest::from_bytes(b"").to_base64(),
                metadata: HashMap::new(),
            },
        );
    }

    /// Snapshot of stored objects, ordered by key
    pub async fn objects(&self) -> Vec<RecordedObject> {
        self.objects.lock().await.values().cloned().collect()
    }

    pub async fn object(&self, key: &str) -> Option<RecordedObject> {
        self.objects.lock().await.get(key).cloned()
    }

    /// Number of successful uploads
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn exists_checks(&self) -> usize {
        self.exists_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    fn backend(&self) -> &'static str {
        "recording"
    }

    async fn exists(&self, prefix: &str) -> bool {
        self.exists_checks.fetch_add(1, Ordering::SeqCst);

        let objects = self.objects.lock().await;
        let count = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            // same page size as the S3 listing
            .take(2)
            .count();

        debug!(prefix, count, "Checked recorded objects");
        count == 2
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, UploadError> {
        if let Some(rule) = self.failure.lock().await.as_ref() {
            if let Some(reason) = rule.reason_for(remote_key) {
                return Err(UploadError::Rejected {
                    key: remote_key.to_string(),
                    reason: reason.to_string(),
                });
            }
        }

        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| UploadError::local_read(local_path, e))?
            .len();
        let digest = ContentDigest::from_file(local_path)
            .await
            .map_err(|e| UploadError::local_read(local_path, e))?;

        self.objects.lock().await.insert(
            remote_key.to_string(),
            RecordedObject {
                key: remote_key.to_string(),
                size,
                content_md5: digest.to_base64(),
                metadata: metadata.clone(),
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);

        info!(key = remote_key, size, "Recorded upload");

        Ok(format!("memory://{}", remote_key))
    }
}
