//! Job state index
//!
//! The pool records one state per job attempt through [`StateIndex::set`]. How
//! the index persists those writes is up to the implementation; the pipeline
//! never reads them back. The scanner uses [`StateIndex::get`] to avoid
//! queueing a job twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job state store shared by every worker
///
/// `set` is called concurrently for different jobs; implementations only need
/// per-key durability of the last write.
#[async_trait]
pub trait StateIndex: Send + Sync {
    /// Record `state` for `job`, tagged with the component that produced it
    async fn set(&self, job: &str, state: JobState, source: &str) -> anyhow::Result<()>;

    async fn get(&self, job: &str) -> anyhow::Result<Option<JobState>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub state: JobState,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
}

/// Process-local index
#[derive(Debug, Default)]
pub struct MemoryStateIndex {
    entries: RwLock<HashMap<String, StateEntry>>,
}

impl MemoryStateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry(&self, job: &str) -> Option<StateEntry> {
        self.entries.read().await.get(job).cloned()
    }

    pub async fn counts(&self) -> StateCounts {
        let entries = self.entries.read().await;
        entries
            .values()
            .fold(StateCounts::default(), |mut counts, entry| {
                match entry.state {
                    JobState::Pending => counts.pending += 1,
                    JobState::Done => counts.done += 1,
                    JobState::Failed => counts.failed += 1,
                }
                counts
            })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl StateIndex for MemoryStateIndex {
    async fn set(&self, job: &str, state: JobState, source: &str) -> anyhow::Result<()> {
        tracing::debug!(job, %state, source, "Updating job state");

        self.entries.write().await.insert(
            job.to_string(),
            StateEntry {
                state,
                source: source.to_string(),
                updated_at: Utc::now(),
            },
        );

        Ok(())
    }

    async fn get(&self, job: &str) -> anyhow::Result<Option<JobState>> {
        Ok(self.entries.read().await.get(job).map(|entry| entry.state))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_last_write_wins() {
        let index = MemoryStateIndex::new();
        index.set("job-a", JobState::Pending, "scanner").await.unwrap();
        index.set("job-a", JobState::Done, "worker").await.unwrap();

        let entry = index.entry("job-a").await.unwrap();
        assert_eq!(entry.state, JobState::Done);
        assert_eq!(entry.source, "worker");
        assert_eq!(index.get("job-b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let index = Arc::new(MemoryStateIndex::new());

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let index = index.clone();
                tokio::spawn(async move {
                    let state = if i % 4 == 0 { JobState::Failed } else { JobState::Done };
                    index.set(&format!("job-{}", i), state, "worker").await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(
            index.counts().await,
            StateCounts {
                pending: 0,
                done: 24,
                failed: 8
            }
        );
        assert_eq!(index.len().await, 32);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&JobState::Done).unwrap(), "\"done\"");
        assert_eq!(JobState::Failed.to_string(), "failed");
    }
}
