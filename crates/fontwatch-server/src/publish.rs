//! Durable job publishing.
//!
//! Every dispatched family ends as one [`DispatchJob`] on the job queue
//! named by [`JOB_QUEUE`]. Delivery is at-least-once; consumers
//! deduplicate on family name and commit.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fontwatch_core::DispatchJob;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Name of the durable job queue.
pub const JOB_QUEUE: &str = "fontwatch-family-jobs";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("job queue closed")]
    Closed,

    #[error("can't write job to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination of dispatch jobs.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publishes `job` to `queue`; resolves once the job is durable.
    async fn publish(&self, queue: &str, job: &DispatchJob) -> Result<(), PublishError>;
}

/// Publishes into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<(String, DispatchJob)>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, DispatchJob)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobPublisher for ChannelPublisher {
    async fn publish(&self, queue: &str, job: &DispatchJob) -> Result<(), PublishError> {
        self.tx
            .send((queue.to_string(), job.clone()))
            .map_err(|_| PublishError::Closed)
    }
}

/// Appends jobs as JSON lines to `<dir>/<queue>.jsonl`, syncing each one
/// to disk before returning.
#[derive(Debug)]
pub struct FilePublisher {
    dir: PathBuf,
    // One writer at a time keeps lines whole.
    write: Mutex<()>,
}

impl FilePublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write: Mutex::new(()),
        }
    }

    pub fn queue_path(&self, queue: &str) -> PathBuf {
        self.dir.join(format!("{queue}.jsonl"))
    }

    async fn append(&self, path: &Path, line: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line).await?;
        file.sync_data().await
    }
}

#[async_trait]
impl JobPublisher for FilePublisher {
    async fn publish(&self, queue: &str, job: &DispatchJob) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(job)?;
        line.push(b'\n');
        let path = self.queue_path(queue);

        let _guard = self.write.lock().await;
        self.append(&path, &line)
            .await
            .map_err(|source| PublishError::Io { path: path.clone(), source })?;
        debug!(queue, family = %job.family_name, path = %path.display(), "job appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fontwatch_core::CacheKey;
    use serde_json::json;

    use super::*;

    fn job(family: &str) -> DispatchJob {
        DispatchJob {
            collection_id: "fontwatch/upstream".into(),
            family_name: family.into(),
            cache_key: CacheKey::new("abc"),
            timestamp: Utc::now(),
            metadata: json!({ "commit": "c0ffee" }),
        }
    }

    #[tokio::test]
    async fn test_channel_publisher() {
        let (publisher, mut rx) = ChannelPublisher::new();
        publisher.publish(JOB_QUEUE, &job("Test Sans")).await.unwrap();

        let (queue, received) = rx.recv().await.unwrap();
        assert_eq!(queue, JOB_QUEUE);
        assert_eq!(received.family_name, "Test Sans");

        drop(rx);
        assert!(matches!(
            publisher.publish(JOB_QUEUE, &job("Test Sans")).await,
            Err(PublishError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_file_publisher_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePublisher::new(dir.path().join("jobs"));
        publisher.publish(JOB_QUEUE, &job("Test Sans")).await.unwrap();
        publisher.publish(JOB_QUEUE, &job("Other Serif")).await.unwrap();

        let text = std::fs::read_to_string(publisher.queue_path(JOB_QUEUE)).unwrap();
        let jobs: Vec<DispatchJob> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].family_name, "Other Serif");
        assert_eq!(jobs[0].commit(), Some("c0ffee"));
    }
}
