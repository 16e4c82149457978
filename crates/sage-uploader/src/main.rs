//! SAGE Uploader - Main entry point

use anyhow::Result;
use sage_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use sage_uploader::{
    build_uploader, job_queue, shutdown_channel, Config, JobPipeline, MemoryStateIndex, Scanner,
    WorkerPool,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("sage-uploader")
        .filter_directives("sage_uploader=debug,aws_config=warn,aws_smithy_runtime=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting SAGE uploader");

    let config = Config::load()?;
    info!(
        data_dir = %config.agent.data_dir.display(),
        workers = config.agent.workers,
        backend = ?config.backend,
        completion = ?config.agent.completion,
        "Configuration loaded"
    );

    let uploader = build_uploader(&config).await?;
    let pipeline = Arc::new(JobPipeline::from_config(&config.agent, uploader));
    let index = Arc::new(MemoryStateIndex::new());
    let (sender, queue) = job_queue(config.agent.queue_capacity);
    let (shutdown, signal) = shutdown_channel();

    let scanner = Scanner::new(&config.agent, index.clone(), sender, signal.clone()).spawn();
    let pool = WorkerPool::new(&config.agent, pipeline, index.clone(), queue.clone(), signal).spawn();

    shutdown_signal().await;
    shutdown.trigger();

    if let Err(e) = scanner.await {
        error!(error = %e, "Scanner task ended abnormally");
    }

    let summary = pool.join().await;
    let counts = index.counts().await;
    info!(
        processed = summary.processed(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        pending = counts.pending,
        left_in_queue = queue.len().await,
        "Uploader shut down gracefully"
    );

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing in-flight jobs");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing in-flight jobs");
        },
    }
}
