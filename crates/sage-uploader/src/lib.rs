//! SAGE Uploader Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Edge-node agent that publishes staged sensor uploads to an object store.
//!
//! # Overview
//!
//! Plugins on a node stage each upload as a directory holding a `data` payload
//! and a `meta` JSON descriptor. The agent:
//!
//! - **Scans** the data directory and queues every staged upload as a [`Job`]
//! - **Normalizes** the descriptor, migrating legacy `timestamp`/`labels` fields
//! - **Uploads** the payload and then its `.meta` sidecar, skipping uploads the
//!   store already holds in full
//! - **Finalizes** the local directory by deleting it or leaving a `done` marker
//! - **Records** every attempt as `done` or `failed` in a [`StateIndex`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sage_uploader::{
//!     build_uploader, job_queue, shutdown_channel, Config, JobPipeline, MemoryStateIndex,
//!     WorkerPool,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let uploader = build_uploader(&config).await?;
//!     let pipeline = Arc::new(JobPipeline::from_config(&config.agent, uploader));
//!     let (_sender, queue) = job_queue(config.agent.queue_capacity);
//!     let (shutdown, signal) = shutdown_channel();
//!
//!     let pool = WorkerPool::new(
//!         &config.agent,
//!         pipeline,
//!         Arc::new(MemoryStateIndex::new()),
//!         queue,
//!         signal,
//!     )
//!     .spawn();
//!
//!     shutdown.trigger();
//!     pool.join().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod provenance;
pub mod queue;
pub mod scanner;
pub mod shutdown;
pub mod target;
pub mod uploader;
pub mod worker;

// Re-export commonly used types
pub use config::{AgentConfig, CompletionAction, Config, UploadBackend};
pub use error::{JobError, JobResult};
pub use index::{JobState, MemoryStateIndex, StateIndex};
pub use pipeline::{JobOutcome, JobPipeline, JobReport, JobStage};
pub use queue::{job_queue, Job, JobQueue, JobSender};
pub use scanner::Scanner;
pub use shutdown::{shutdown_channel, Shutdown, ShutdownSignal};
pub use uploader::{build_uploader, Uploader};
pub use worker::{PoolHandle, PoolSummary, WorkerPool, WorkerStats};
