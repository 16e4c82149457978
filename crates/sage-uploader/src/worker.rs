//! Worker pool
//!
//! Each worker polls the shared queue, runs the pipeline for one job at a time
//! and records the outcome in the state index. Shutdown is checked between
//! jobs only: a job that has been taken always runs to completion.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::index::{JobState, StateIndex};
use crate::pipeline::JobPipeline;
use crate::queue::{Job, JobQueue};
use crate::shutdown::ShutdownSignal;

/// Source tag written with every worker state update
pub const STATE_SOURCE: &str = "worker";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: usize,
    /// Jobs that reached Done, including skipped ones
    pub processed: usize,
    pub failed: usize,
    /// Jobs found already complete in the store
    pub skipped: usize,
}

impl WorkerStats {
    fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }
}

pub struct Worker {
    id: usize,
    pipeline: Arc<JobPipeline>,
    index: Arc<dyn StateIndex>,
    queue: JobQueue,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        id: usize,
        pipeline: Arc<JobPipeline>,
        index: Arc<dyn StateIndex>,
        queue: JobQueue,
        shutdown: ShutdownSignal,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            pipeline,
            index,
            queue,
            shutdown,
            poll_interval,
            stats: WorkerStats::new(id),
        }
    }

    /// Poll until shutdown, returning what this worker did
    pub async fn run(mut self) -> WorkerStats {
        info!(worker_id = self.id, "Worker started");

        loop {
            // shutdown wins over a ready job
            if self.shutdown.is_set() {
                info!(worker_id = self.id, "Shutdown requested, worker stopping");
                break;
            }

            match self.queue.try_next().await {
                Some(job) => self.handle(job).await,
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }

        self.stats
    }

    async fn handle(&mut self, job: Job) {
        let started = Instant::now();
        debug!(worker_id = self.id, job = %job, "Picked up job");

        let state = match self.pipeline.process(&job).await {
            Ok(report) => {
                self.stats.processed += 1;
                if report.was_skipped() {
                    self.stats.skipped += 1;
                }
                info!(
                    worker_id = self.id,
                    job = %job,
                    key = %report.data_key,
                    outcome = ?report.outcome,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job done"
                );
                JobState::Done
            },
            Err(e) => {
                self.stats.failed += 1;
                error!(
                    worker_id = self.id,
                    job = %job,
                    stage = %e.stage(),
                    error = ?anyhow::Error::from(e),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job failed"
                );
                JobState::Failed
            },
        };

        if let Err(e) = self.index.set(job.as_str(), state, STATE_SOURCE).await {
            warn!(job = %job, %state, error = %e, "Failed to record job state");
        }
    }
}

/// N workers sharing one queue, index and pipeline
pub struct WorkerPool {
    workers: usize,
    poll_interval: Duration,
    pipeline: Arc<JobPipeline>,
    index: Arc<dyn StateIndex>,
    queue: JobQueue,
    shutdown: ShutdownSignal,
}

impl WorkerPool {
    pub fn new(
        config: &AgentConfig,
        pipeline: Arc<JobPipeline>,
        index: Arc<dyn StateIndex>,
        queue: JobQueue,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            workers: config.workers,
            poll_interval: config.poll_interval,
            pipeline,
            index,
            queue,
            shutdown,
        }
    }

    pub fn spawn(self) -> PoolHandle {
        info!(workers = self.workers, "Starting worker pool");

        let handles = (0..self.workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    self.pipeline.clone(),
                    self.index.clone(),
                    self.queue.clone(),
                    self.shutdown.clone(),
                    self.poll_interval,
                );
                tokio::spawn(worker.run())
            })
            .collect();

        PoolHandle { handles }
    }
}

pub struct PoolHandle {
    handles: Vec<JoinHandle<WorkerStats>>,
}

/// Aggregated result of a finished pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub workers: Vec<WorkerStats>,
    /// Workers whose task panicked or was cancelled
    pub lost: usize,
}

impl PoolSummary {
    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed).sum()
    }

    pub fn failed(&self) -> usize {
        self.workers.iter().map(|w| w.failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.workers.iter().map(|w| w.skipped).sum()
    }
}

impl PoolHandle {
    /// Wait for every worker to stop
    pub async fn join(self) -> PoolSummary {
        let mut summary = PoolSummary::default();

        for result in futures::future::join_all(self.handles).await {
            match result {
                Ok(stats) => summary.workers.push(stats),
                Err(e) => {
                    error!(error = %e, "Worker task ended abnormally");
                    summary.lost += 1;
                },
            }
        }

        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::CompletionAction;
    use crate::index::MemoryStateIndex;
    use crate::queue::job_queue;
    use crate::shutdown::shutdown_channel;
    use crate::target::{DATA_FILE, META_FILE};
    use crate::uploader::RecordingUploader;
    use tempfile::TempDir;

    fn stage(root: &std::path::Path, job: &str, meta: &str) {
        let dir = root.join(job);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DATA_FILE), b"payload").unwrap();
        std::fs::write(dir.join(META_FILE), meta).unwrap();
    }

    #[tokio::test]
    async fn test_worker_records_done_and_failed() {
        let root = TempDir::new().unwrap();
        let good = "node-a/uploads/plugin/1.0/cap1";
        let bad = "node-a/uploads/plugin/1.0/cap2";
        stage(root.path(), good, r#"{"ts": 1, "meta": {"filename": "x.txt"}}"#);
        stage(root.path(), bad, r#"{"ts": 2, "meta": {}}"#);

        let uploader = Arc::new(RecordingUploader::new());
        let pipeline = Arc::new(JobPipeline::new(
            root.path(),
            CompletionAction::Sentinel,
            uploader.clone(),
        ));
        let index = Arc::new(MemoryStateIndex::new());
        let (tx, queue) = job_queue(8);
        let (shutdown, signal) = shutdown_channel();

        tx.send(Job::from(good)).await.unwrap();
        tx.send(Job::from(bad)).await.unwrap();

        let worker = Worker::new(
            0,
            pipeline,
            index.clone(),
            queue.clone(),
            signal,
            Duration::from_millis(5),
        );
        let task = tokio::spawn(worker.run());

        while queue.len().await > 0 || index.len().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.trigger();
        let stats = task.await.unwrap();

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(index.get(good).await.unwrap(), Some(JobState::Done));
        assert_eq!(index.get(bad).await.unwrap(), Some(JobState::Failed));
        assert_eq!(index.entry(bad).await.unwrap().source, STATE_SOURCE);
        assert_eq!(uploader.upload_count(), 2);
    }

    #[tokio::test]
    async fn test_pool_stops_without_draining() {
        let root = TempDir::new().unwrap();
        let pipeline = Arc::new(JobPipeline::new(
            root.path(),
            CompletionAction::Sentinel,
            Arc::new(RecordingUploader::new()),
        ));
        let index = Arc::new(MemoryStateIndex::new());
        let (tx, queue) = job_queue(8);
        let (shutdown, signal) = shutdown_channel();

        // triggered before any worker looks at the queue
        shutdown.trigger();
        tx.send(Job::from("node-a/uploads/plugin/1.0/cap1")).await.unwrap();

        let config = AgentConfig {
            workers: 3,
            ..Default::default()
        };
        let handle = WorkerPool::new(&config, pipeline, index.clone(), queue.clone(), signal).spawn();

        let summary = handle.join().await;

        assert_eq!(summary.workers.len(), 3);
        assert_eq!(summary.processed() + summary.failed(), 0);
        assert_eq!(queue.len().await, 1);
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_backs_off_until_shutdown() {
        let root = TempDir::new().unwrap();
        let uploader = Arc::new(RecordingUploader::new());
        let pipeline = Arc::new(JobPipeline::new(
            root.path(),
            CompletionAction::Sentinel,
            uploader.clone(),
        ));
        let (_tx, queue) = job_queue(1);
        let (shutdown, signal) = shutdown_channel();

        let worker = Worker::new(
            7,
            pipeline,
            Arc::new(MemoryStateIndex::new()),
            queue,
            signal,
            Duration::from_secs(30),
        );
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(!task.is_finished());

        shutdown.trigger();
        let stats = task.await.unwrap();

        assert_eq!(stats, WorkerStats::new(7));
        assert_eq!(uploader.exists_checks(), 0);
    }
}
