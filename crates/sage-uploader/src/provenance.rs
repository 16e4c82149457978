//! Provenance parsing
//!
//! Job identifiers are relative upload paths. Two layouts are in use:
//!
//! ```text
//! node-<id>/<slot>/<namespace>/<name>/<version>/<capture>   6 segments
//! node-<id>/<slot>/<name>/<version>/<capture>               5 segments, namespace "sage"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Namespace assumed when the path does not carry one
pub const DEFAULT_NAMESPACE: &str = "sage";

const NODE_PREFIX: &str = "node-";

/// Origin of an upload, decoded from its job path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceInfo {
    pub node_id: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl ProvenanceInfo {
    /// Decode a job path into its provenance fields
    pub fn parse(path: &str) -> JobResult<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        let node_id = segments[0].strip_prefix(NODE_PREFIX).unwrap_or(segments[0]);

        let (namespace, name, version) = match segments.len() {
            6 => (segments[2], segments[3], segments[4]),
            5 => (DEFAULT_NAMESPACE, segments[2], segments[3]),
            n => {
                return Err(JobError::MalformedPath {
                    path: path.to_string(),
                    segments: n,
                })
            },
        };

        Ok(Self {
            node_id: node_id.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// `<namespace>/<name>:<version>`, the plugin reference injected into metadata
    pub fn plugin_ref(&self) -> String {
        format!("{}/{}:{}", self.namespace, self.name, self.version)
    }

    /// `<namespace>-<name>-<version>`, the instance folder in the remote layout
    pub fn instance_id(&self) -> String {
        format!("{}-{}-{}", self.namespace, self.name, self.version)
    }
}
