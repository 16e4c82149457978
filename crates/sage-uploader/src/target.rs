//! Remote object keys for an upload
//!
//! Layout: `node-data/sage/<namespace>-<name>-<version>/<node>/<ts>-<filename>`
//! plus a `.meta` sibling for the descriptor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::metadata::NormalizedMetadata;
use crate::provenance::ProvenanceInfo;

pub const ROOT_FOLDER: &str = "node-data";
pub const JOB_ID: &str = "sage";

/// Payload file inside an upload directory
pub const DATA_FILE: &str = "data";
/// Descriptor file inside an upload directory
pub const META_FILE: &str = "meta";
/// Marker left in the upload directory after a successful upload
pub const SENTINEL_FILE: &str = "done";

/// Everything needed to publish one upload directory
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTarget {
    pub remote_prefix: String,
    pub local_data_file: PathBuf,
    pub local_meta_file: PathBuf,
    pub data_name: String,
    pub meta_name: String,
    /// Object metadata attached to the data object
    pub metadata: HashMap<String, String>,
}

impl UploadTarget {
    pub fn build(job_dir: &Path, provenance: &ProvenanceInfo, meta: &NormalizedMetadata) -> Self {
        let data_name = format!("{}-{}", meta.epoch_nano, meta.filename());

        Self {
            remote_prefix: format!(
                "{}/{}/{}/{}",
                ROOT_FOLDER,
                JOB_ID,
                provenance.instance_id(),
                provenance.node_id
            ),
            local_data_file: job_dir.join(DATA_FILE),
            local_meta_file: job_dir.join(META_FILE),
            meta_name: format!("{}.meta", data_name),
            data_name,
            metadata: meta.to_remote_metadata(),
        }
    }

    /// Key of the data object. Also the prefix probed by the idempotency check,
    /// since the sidecar key extends it.
    pub fn data_key(&self) -> String {
        format!("{}/{}", self.remote_prefix, self.data_name)
    }

    pub fn meta_key(&self) -> String {
        format!("{}/{}", self.remote_prefix, self.meta_name)
    }
}
