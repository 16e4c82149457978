//! Sidecar metadata normalization
//!
//! Upload directories carry a `meta` JSON descriptor written by the plugin
//! runtime. Two generations of the schema are in the field: the current one
//! uses `ts` and `meta`, older runtimes wrote `timestamp` and `labels`.
//! [`normalize`] folds both into [`NormalizedMetadata`], which has no room for
//! the deprecated fields at all.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{JobError, JobResult};
use crate::provenance::ProvenanceInfo;

/// Record name written for every upload
pub const UPLOAD_RECORD_NAME: &str = "upload";

/// Required key in the metadata mapping
pub const FILENAME_KEY: &str = "filename";

/// Descriptor as found on disk. `name` and `val` must be strings when present
/// but their values are ignored.
#[derive(Debug, Default, Deserialize)]
struct Descriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    val: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    shasum: Option<String>,
    #[serde(default)]
    labels: Option<Map<String, Value>>,
    #[serde(default)]
    meta: Option<Map<String, Value>>,
}

/// Canonical metadata record for one upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMetadata {
    pub name: String,
    #[serde(rename = "ts")]
    pub epoch_nano: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    pub meta: Map<String, Value>,
    /// Output-only URL field
    #[serde(rename = "val")]
    pub value: String,
    #[serde(skip)]
    filename: String,
}

impl NormalizedMetadata {
    /// Validated, non-empty `filename` entry
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Flatten into object-store metadata.
    ///
    /// Only string values of the mapping survive as `meta.<key>`; numbers,
    /// booleans and nested values are dropped, which existing consumers of
    /// the bucket rely on.
    pub fn to_remote_metadata(&self) -> HashMap<String, String> {
        let mut remote = HashMap::with_capacity(self.meta.len() + 3);
        remote.insert("name".to_string(), self.name.clone());
        remote.insert("ts".to_string(), self.epoch_nano.to_string());
        if let Some(ref shasum) = self.shasum {
            remote.insert("shasum".to_string(), shasum.clone());
        }

        for (key, value) in &self.meta {
            if let Value::String(s) = value {
                remote.insert(format!("meta.{}", key), s.clone());
            }
        }

        remote
    }
}

/// Parse and normalize a raw descriptor for the upload described by `provenance`
pub fn normalize(raw: &[u8], provenance: &ProvenanceInfo) -> JobResult<NormalizedMetadata> {
    let descriptor: Descriptor = serde_json::from_slice(raw)?;

    let epoch_nano = descriptor.timestamp.or(descriptor.ts).unwrap_or_default();

    // labels only count when meta has nothing to offer
    let mut meta = match descriptor.meta {
        Some(meta) if !meta.is_empty() => meta,
        _ => descriptor.labels.unwrap_or_default(),
    };

    let filename = match meta.get(FILENAME_KEY) {
        None => return Err(JobError::MissingField { field: FILENAME_KEY }),
        Some(Value::String(s)) if s.is_empty() => {
            return Err(JobError::EmptyField { field: FILENAME_KEY })
        },
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(JobError::TypeMismatch { field: FILENAME_KEY }),
    };

    meta.insert("node".to_string(), Value::String(provenance.node_id.to_lowercase()));
    meta.insert("plugin".to_string(), Value::String(provenance.plugin_ref()));

    // checksums from the node are never forwarded
    if descriptor.shasum.is_some() {
        tracing::trace!("dropping node supplied shasum");
    }
    if descriptor.name.is_some() || descriptor.val.is_some() {
        tracing::trace!(name = ?descriptor.name, val = ?descriptor.val, "ignoring input name and val");
    }

    Ok(NormalizedMetadata {
        name: UPLOAD_RECORD_NAME.to_string(),
        epoch_nano,
        shasum: None,
        meta,
        value: String::new(),
        filename,
    })
}
