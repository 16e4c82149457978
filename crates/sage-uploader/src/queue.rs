//! Shared job queue
//!
//! A bounded channel with a single producer side (the scanner, or a test) and
//! any number of workers polling it without blocking.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Relative path of one staged upload directory under the data directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Job(String);

impl Job {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Job {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for Job {
    fn from(path: String) -> Self {
        Self(path)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("job queue closed, dropped job {0}")]
pub struct QueueClosed(pub Job);

/// Create a bounded job queue
pub fn job_queue(capacity: usize) -> (JobSender, JobQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        JobSender { tx },
        JobQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side of the queue
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Job>,
}

impl JobSender {
    /// Enqueue a job, waiting for capacity
    pub async fn send(&self, job: Job) -> Result<(), QueueClosed> {
        self.tx.send(job).await.map_err(|e| QueueClosed(e.0))
    }
}

/// Consumer side of the queue, cloned into every worker
#[derive(Debug, Clone)]
pub struct JobQueue {
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl JobQueue {
    /// Take the next job if one is ready
    pub async fn try_next(&self) -> Option<Job> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Jobs waiting to be taken
    pub async fn len(&self) -> usize {
        self.rx.lock().await.len()
    }
}
