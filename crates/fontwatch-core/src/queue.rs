//! Keyed job queue and bounded worker pools.
//!
//! The queue is the only mutual-exclusion primitive fontwatch uses. Callers
//! pick a key naming the contended resource (a repository path, the cache
//! client, one process) and every job scheduled under that key runs alone,
//! in submission order. Jobs under different keys run concurrently.
//!
//! Jobs are spawned onto the runtime as soon as their turn comes and always
//! run to completion; dropping a [`JobHandle`] only stops waiting for the
//! result. There is no timeout at this level, so a stuck job blocks its own
//! key until it finishes.
//!
//! ```ignore
//! let queue = JobQueue::new();
//! let first = queue.schedule("git.lock /srv/fonts", || async { fetch().await });
//! let second = queue.schedule("git.lock /srv/fonts", || async { diff().await });
//! // `second` starts only after `first` settled, even if `first` panicked.
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, join_all};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::error::QueueError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// One active key: its channel and the number of queued or running jobs.
struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    pending: usize,
}

#[derive(Default)]
struct Lanes {
    lanes: Mutex<HashMap<String, Lane>>,
}

impl Lanes {
    /// Marks one job of `key` as settled. Returns true once the lane is empty
    /// and has been removed, at which point its worker must stop.
    fn release(&self, key: &str) -> bool {
        let mut lanes = self.lanes.lock();
        let drained = match lanes.get_mut(key) {
            Some(lane) => {
                lane.pending -= 1;
                lane.pending == 0
            }
            None => true,
        };
        if drained {
            lanes.remove(key);
        }
        drained
    }
}

/// Per-key FIFO job queue.
///
/// Cloning is cheap and clones share the same lanes.
#[derive(Clone, Default)]
pub struct JobQueue {
    lanes: Arc<Lanes>,
}

impl JobQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `job` under `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut, T>(&self, key: impl Into<String>, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let key = key.into();
        let (result_tx, result_rx) = oneshot::channel();
        let job_key = key.clone();

        let run: Job = Box::new(move || {
            async move {
                let outcome = tokio::spawn(async move { job().await }).await;
                let result = outcome.map_err(|e| {
                    let reason = join_error_reason(e);
                    warn!(key = %job_key, %reason, "queued job aborted");
                    QueueError::aborted(job_key, reason)
                });
                // The caller may have stopped waiting.
                let _ = result_tx.send(result);
            }
            .boxed()
        });

        self.enqueue(&key, run);
        JobHandle { key, rx: result_rx }
    }

    /// Number of jobs queued or running under `key`.
    pub fn pending(&self, key: &str) -> usize {
        self.lanes.lanes.lock().get(key).map_or(0, |lane| lane.pending)
    }

    /// Number of keys with queued or running jobs.
    pub fn active_keys(&self) -> usize {
        self.lanes.lanes.lock().len()
    }

    fn enqueue(&self, key: &str, job: Job) {
        let shared = Arc::clone(&self.lanes);
        let mut lanes = self.lanes.lanes.lock();
        let lane = lanes.entry(key.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            spawn_lane(shared, key.to_string(), rx);
            debug!(key, "queue lane opened");
            Lane { tx, pending: 0 }
        });

        lane.pending += 1;
        if lane.tx.send(job).is_err() {
            // Only reachable if the worker died; the handle reports the loss.
            lane.pending -= 1;
            warn!(key, "queue lane closed, job dropped");
        }
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

fn spawn_lane(lanes: Arc<Lanes>, key: String, mut rx: mpsc::UnboundedReceiver<Job>) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            job().await;
            if lanes.release(&key) {
                debug!(key = %key, "queue lane drained");
                break;
            }
        }
    });
}

fn join_error_reason(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(msg) = payload.downcast_ref::<&str>() {
            format!("panicked: {msg}")
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            format!("panicked: {msg}")
        } else {
            "panicked".to_string()
        }
    } else {
        "cancelled".to_string()
    }
}

/// Result future of a scheduled job.
#[derive(Debug)]
pub struct JobHandle<T> {
    key: String,
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> JobHandle<T> {
    /// The key the job was scheduled under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::aborted(
                this.key.clone(),
                "job dropped before completion",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs `func` over `items` with at most `max_workers` in flight.
///
/// Workers drain one shared list, so a slow item never holds a slot that
/// another worker could use. Each item reports through its own handle,
/// in the order the items were given; completion order is unspecified.
/// `max_workers == 0` is treated as 1.
pub fn map_parallel<I, F, Fut, T>(
    func: F,
    items: impl IntoIterator<Item = I>,
    max_workers: usize,
) -> Vec<JobHandle<T>>
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let func = Arc::new(func);
    let mut handles = Vec::new();
    let mut work = VecDeque::new();

    for (index, item) in items.into_iter().enumerate() {
        let (tx, rx) = oneshot::channel();
        let key = format!("map_parallel#{index}");
        handles.push(JobHandle {
            key: key.clone(),
            rx,
        });
        work.push_back((key, item, tx));
    }

    let workers = max_workers.max(1).min(work.len());
    let work = Arc::new(Mutex::new(work));

    for _ in 0..workers {
        let work = Arc::clone(&work);
        let func = Arc::clone(&func);
        tokio::spawn(async move {
            loop {
                let next = work.lock().pop_front();
                let Some((key, item, tx)) = next else {
                    break;
                };
                let func = Arc::clone(&func);
                let outcome = tokio::spawn(async move { (*func)(item).await }).await;
                let _ = tx.send(outcome.map_err(|e| QueueError::aborted(key, join_error_reason(e))));
            }
        });
    }

    handles
}

/// Awaits every handle and returns the results in submission order.
pub async fn settle_all<T>(handles: impl IntoIterator<Item = JobHandle<T>>) -> Vec<Result<T, QueueError>> {
    join_all(handles).await
}
