//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::uploader::StorageConfig;

// ============================================================================
// Agent Configuration Constants
// ============================================================================

/// Default root directory holding staged upload directories.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default idle back-off when the queue is empty, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default delay between data directory scans, in seconds.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;

/// Default capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Uploader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub backend: UploadBackend,
    pub storage: StorageConfig,
}

/// Worker pool and scanner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub workers: usize,
    pub poll_interval: Duration,
    pub scan_interval: Duration,
    pub queue_capacity: usize,
    pub completion: CompletionAction,
}

/// What happens to an upload directory once its objects are in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionAction {
    /// Remove the directory and everything in it
    Delete,
    /// Leave the directory and drop an empty `done` file into it
    Sentinel,
}

impl CompletionAction {
    pub fn from_delete_flag(delete: bool) -> Self {
        if delete {
            CompletionAction::Delete
        } else {
            CompletionAction::Sentinel
        }
    }
}

/// Remote store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadBackend {
    S3,
    Recording,
}

impl FromStr for UploadBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(UploadBackend::S3),
            "recording" | "memory" => Ok(UploadBackend::Recording),
            other => anyhow::bail!("Unknown upload backend '{}' (expected s3 or recording)", other),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build configuration from the process environment only
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("UPLOADER_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => UploadBackend::S3,
        };

        let config = Config {
            agent: AgentConfig {
                data_dir: std::env::var("UPLOADER_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
                workers: std::env::var("UPLOADER_WORKERS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WORKERS),
                poll_interval: Duration::from_millis(
                    std::env::var("UPLOADER_POLL_INTERVAL_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
                scan_interval: Duration::from_secs(
                    std::env::var("UPLOADER_SCAN_INTERVAL_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS),
                ),
                queue_capacity: std::env::var("UPLOADER_QUEUE_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_QUEUE_CAPACITY),
                completion: CompletionAction::from_delete_flag(
                    std::env::var("UPLOADER_DELETE_ON_SUCCESS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(false),
                ),
            },
            backend,
            storage: StorageConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }

        if self.agent.queue_capacity == 0 {
            anyhow::bail!("Queue capacity must be greater than 0");
        }

        if self.agent.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.backend == UploadBackend::S3 && self.storage.bucket.trim().is_empty() {
            anyhow::bail!("S3 bucket cannot be empty");
        }

        if self.agent.scan_interval.is_zero() {
            tracing::warn!("Scan interval is 0 - the data directory will be rescanned continuously");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            backend: UploadBackend::S3,
            storage: StorageConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            workers: DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            completion: CompletionAction::Sentinel,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "UPLOADER_DATA_DIR",
        "UPLOADER_WORKERS",
        "UPLOADER_POLL_INTERVAL_MS",
        "UPLOADER_SCAN_INTERVAL_SECS",
        "UPLOADER_QUEUE_CAPACITY",
        "UPLOADER_DELETE_ON_SUCCESS",
        "UPLOADER_BACKEND",
        "S3_BUCKET",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.agent.data_dir, PathBuf::from("/data"));
        assert_eq!(config.agent.workers, DEFAULT_WORKERS);
        assert_eq!(config.agent.poll_interval, Duration::from_secs(1));
        assert_eq!(config.agent.completion, CompletionAction::Sentinel);
        assert_eq!(config.backend, UploadBackend::S3);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("UPLOADER_DATA_DIR", "/tmp/uploads");
        std::env::set_var("UPLOADER_WORKERS", "8");
        std::env::set_var("UPLOADER_POLL_INTERVAL_MS", "250");
        std::env::set_var("UPLOADER_DELETE_ON_SUCCESS", "true");
        std::env::set_var("UPLOADER_BACKEND", "recording");

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.agent.data_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.agent.workers, 8);
        assert_eq!(config.agent.poll_interval, Duration::from_millis(250));
        assert_eq!(config.agent.completion, CompletionAction::Delete);
        assert_eq!(config.backend, UploadBackend::Recording);
    }

    #[test]
    #[serial]
    fn test_unknown_backend_rejected() {
        clear_env();
        std::env::set_var("UPLOADER_BACKEND", "ftp");

        let result = Config::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.agent.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bucket_only_required_for_s3() {
        let mut config = Config::default();
        config.storage.bucket = String::new();
        assert!(config.validate().is_err());

        config.backend = UploadBackend::Recording;
        assert!(config.validate().is_ok());
    }
}
