//! Data directory scanner
//!
//! Finds staged upload directories (a `data` and a `meta` file, no `done`
//! marker) at the two supported depths and feeds them to the job queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::AgentConfig;
use crate::index::{JobState, StateIndex};
use crate::queue::{Job, JobSender};
use crate::shutdown::ShutdownSignal;
use crate::target::{DATA_FILE, META_FILE, SENTINEL_FILE};

/// Source tag written when a job is queued
pub const SCANNER_SOURCE: &str = "scanner";

/// Job paths have five or six segments
const MIN_JOB_DEPTH: usize = 5;
const MAX_JOB_DEPTH: usize = 6;

/// List every pending upload directory under `data_dir`, sorted
pub fn discover_jobs(data_dir: &Path) -> Vec<Job> {
    let mut jobs: Vec<Job> = WalkDir::new(data_dir)
        .min_depth(MIN_JOB_DEPTH)
        .max_depth(MAX_JOB_DEPTH)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during scan");
                None
            },
        })
        .filter(|entry| entry.file_type().is_dir() && is_pending_upload(entry.path()))
        .filter_map(|entry| job_for(data_dir, entry.path()))
        .collect();

    jobs.sort();
    jobs
}

fn is_pending_upload(dir: &Path) -> bool {
    dir.join(DATA_FILE).is_file()
        && dir.join(META_FILE).is_file()
        && !dir.join(SENTINEL_FILE).exists()
}

fn job_for(data_dir: &Path, dir: &Path) -> Option<Job> {
    let relative = dir.strip_prefix(data_dir).ok()?;
    let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();

    match segments {
        Some(segments) => Some(Job::new(segments.join("/"))),
        None => {
            warn!(path = %dir.display(), "Skipping non UTF-8 upload path");
            None
        },
    }
}

pub struct Scanner {
    data_dir: PathBuf,
    interval: Duration,
    index: Arc<dyn StateIndex>,
    sender: JobSender,
    shutdown: ShutdownSignal,
}

impl Scanner {
    pub fn new(
        config: &AgentConfig,
        index: Arc<dyn StateIndex>,
        sender: JobSender,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            interval: config.scan_interval,
            index,
            sender,
            shutdown,
        }
    }

    /// Queue every discovered job not already pending, returning how many were queued
    pub async fn scan_once(&mut self) -> anyhow::Result<usize> {
        let data_dir = self.data_dir.clone();
        let jobs = tokio::task::spawn_blocking(move || discover_jobs(&data_dir)).await?;

        let mut queued = 0;
        for job in jobs {
            if self.index.get(job.as_str()).await? == Some(JobState::Pending) {
                continue;
            }

            self.index
                .set(job.as_str(), JobState::Pending, SCANNER_SOURCE)
                .await?;

            // a full queue must not block shutdown
            tokio::select! {
                sent = self.sender.send(job) => sent?,
                _ = self.shutdown.wait() => break,
            }
            queued += 1;
        }

        Ok(queued)
    }

    pub async fn run(mut self) {
        info!(dir = %self.data_dir.display(), interval = ?self.interval, "Scanner started");

        loop {
            if self.shutdown.is_set() {
                break;
            }

            match self.scan_once().await {
                Ok(0) => {},
                Ok(queued) => debug!(queued, "Queued upload jobs"),
                Err(e) => warn!(error = %e, "Scan failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = self.shutdown.wait() => break,
            }
        }

        info!("Scanner stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::index::MemoryStateIndex;
    use crate::queue::job_queue;
    use crate::shutdown::shutdown_channel;
    use tempfile::TempDir;

    fn stage(root: &Path, job: &str, files: &[&str]) {
        let dir = root.join(job);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            std::fs::write(dir.join(file), b"x").unwrap();
        }
    }

    #[test]
    fn test_discover_both_layouts() {
        let root = TempDir::new().unwrap();
        stage(root.path(), "node-a/uploads/ns/plugin/1.0/cap1", &[DATA_FILE, META_FILE]);
        stage(root.path(), "node-a/uploads/plugin/1.0/cap2", &[DATA_FILE, META_FILE]);
        stage(root.path(), "node-a/uploads/plugin/1.0/cap3", &[DATA_FILE, META_FILE, SENTINEL_FILE]);
        stage(root.path(), "node-a/uploads/plugin/1.0/cap4", &[DATA_FILE]);
        stage(root.path(), "node-a/uploads/plugin/cap5", &[DATA_FILE, META_FILE]);

        let jobs = discover_jobs(root.path());

        assert_eq!(
            jobs,
            vec![
                Job::from("node-a/uploads/ns/plugin/1.0/cap1"),
                Job::from("node-a/uploads/plugin/1.0/cap2"),
            ]
        );
    }

    #[test]
    fn test_discover_missing_root() {
        assert!(discover_jobs(Path::new("/nonexistent/sage/data")).is_empty());
    }

    #[tokio::test]
    async fn test_scan_marks_pending_once() {
        let root = TempDir::new().unwrap();
        let job = "node-a/uploads/plugin/1.0/cap1";
        stage(root.path(), job, &[DATA_FILE, META_FILE]);

        let index = Arc::new(MemoryStateIndex::new());
        let (tx, queue) = job_queue(4);
        let (_shutdown, signal) = shutdown_channel();
        let config = AgentConfig {
            data_dir: root.path().to_path_buf(),
            ..Default::default()
        };
        let mut scanner = Scanner::new(&config, index.clone(), tx, signal);

        assert_eq!(scanner.scan_once().await.unwrap(), 1);
        assert_eq!(scanner.scan_once().await.unwrap(), 0);

        assert_eq!(index.entry(job).await.unwrap().source, SCANNER_SOURCE);
        assert_eq!(queue.try_next().await, Some(Job::from(job)));
        assert_eq!(queue.try_next().await, None);
    }

    #[tokio::test]
    async fn test_scan_requeues_failed_jobs() {
        let root = TempDir::new().unwrap();
        let job = "node-a/uploads/plugin/1.0/cap1";
        stage(root.path(), job, &[DATA_FILE, META_FILE]);

        let index = Arc::new(MemoryStateIndex::new());
        index.set(job, JobState::Failed, "worker").await.unwrap();
        let (tx, queue) = job_queue(4);
        let (_shutdown, signal) = shutdown_channel();
        let config = AgentConfig {
            data_dir: root.path().to_path_buf(),
            ..Default::default()
        };
        let mut scanner = Scanner::new(&config, index.clone(), tx, signal);

        assert_eq!(scanner.scan_once().await.unwrap(), 1);
        assert_eq!(index.get(job).await.unwrap(), Some(JobState::Pending));
        assert_eq!(queue.len().await, 1);
    }
}
