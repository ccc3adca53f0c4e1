//! Source service.
//!
//! Front door of the registered [`Source`]s. Every source operation runs on
//! the shared job queue under [`SCHEDULE_QUEUE_KEY`], so passes, listings and
//! lookups never interleave on the same mirrors.

mod sink;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use fontwatch_core::{
    FamilyDescriptor, FamilyMetadata, JobHandle, JobQueue, LicenseDir, Result, Source, SourceError,
    UpdateSummary, flatten,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::metrics::dispatch as dispatch_metrics;

pub use sink::{CacheSink, ChannelSink, DelayedReply, ReplyRecord, ResponseSink, SinkError, is_valid_target};

/// Queue key every source operation runs under.
pub const SCHEDULE_QUEUE_KEY: &str = "schedule";

/// A scheduled update pass.
pub type PendingPoke = (String, JobHandle<Result<UpdateSummary>>);

/// Outcome of one settled update pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PokeReport {
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<UpdateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PokeReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub name: String,
    pub size: usize,
}

/// A family without its file contents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilySummary {
    pub family_name: String,
    pub license_dir: LicenseDir,
    pub metadata: FamilyMetadata,
    pub files: Vec<FileSummary>,
}

impl From<&FamilyDescriptor> for FamilySummary {
    fn from(family: &FamilyDescriptor) -> Self {
        Self {
            family_name: family.family_name.clone(),
            license_dir: family.license_dir,
            metadata: family.metadata.clone(),
            files: family
                .sorted_files()
                .into_iter()
                .map(|f| FileSummary {
                    name: f.name.clone(),
                    size: f.data.len(),
                })
                .collect(),
        }
    }
}

/// Registry of sources plus the queue their operations run on.
#[derive(Clone)]
pub struct SourceService {
    sources: Arc<BTreeMap<String, Arc<dyn Source>>>,
    queue: JobQueue,
    sink: Arc<dyn ResponseSink>,
}

impl SourceService {
    pub fn new(queue: JobQueue, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            sources: Arc::new(BTreeMap::new()),
            queue,
            sink,
        }
    }

    /// Registers `source` under its id, replacing any previous one.
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        Arc::make_mut(&mut self.sources).insert(source.id().to_string(), source);
        self
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    fn source(&self, source_id: &str) -> Result<Arc<dyn Source>> {
        self.sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| SourceError::UnknownSource(source_id.to_string()))
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        flatten(self.queue.schedule(SCHEDULE_QUEUE_KEY, op).await)
    }

    /// Initializes every source. A failing source is logged and left
    /// registered; its operations fail until it recovers.
    pub async fn init_all(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(self.sources.len());
        for (id, source) in self.sources.iter() {
            let source = Arc::clone(source);
            let result = self.run(move || async move { source.init().await }).await;
            match &result {
                Ok(()) => info!(source = %id, "source initialized"),
                Err(e) => error!(source = %id, error = %e, "source init failed"),
            }
            results.push((id.clone(), result));
        }
        results
    }

    /// Schedules an update pass of `source_id`, or of every source when it
    /// is empty. Returns as soon as the passes are queued.
    pub fn poke(&self, source_id: &str, force: bool) -> Result<Vec<PendingPoke>> {
        let targets: Vec<Arc<dyn Source>> = if source_id.is_empty() {
            self.sources.values().cloned().collect()
        } else {
            vec![self.source(source_id)?]
        };

        Ok(targets
            .into_iter()
            .map(|source| {
                let id = source.id().to_string();
                info!(source = %id, force, "update scheduled");
                let handle = self
                    .queue
                    .schedule(SCHEDULE_QUEUE_KEY, move || async move { source.update(force).await });
                (id, handle)
            })
            .collect())
    }

    /// Waits for scheduled passes and records their outcome.
    pub async fn settle(pending: Vec<PendingPoke>) -> Vec<PokeReport> {
        let mut reports = Vec::with_capacity(pending.len());
        for (source_id, handle) in pending {
            let result = flatten(handle.await);
            dispatch_metrics::record_update(&source_id, result.is_ok());
            let report = match result {
                Ok(summary) => {
                    info!(
                        source = %source_id,
                        dispatched = summary.dispatched.len(),
                        skipped = summary.skipped.len(),
                        "update finished"
                    );
                    PokeReport {
                        source_id,
                        summary: Some(summary),
                        error: None,
                    }
                },
                Err(e) => {
                    error!(source = %source_id, error = %e, "update failed");
                    PokeReport {
                        source_id,
                        summary: None,
                        error: Some(e.to_string()),
                    }
                },
            };
            reports.push(report);
        }
        reports
    }

    pub async fn list(&self, source_id: &str) -> Result<Vec<String>> {
        let source = self.source(source_id)?;
        self.run(move || async move { source.list().await }).await
    }

    pub async fn get(&self, source_id: &str, family: &str) -> Result<FamilyDescriptor> {
        let source = self.source(source_id)?;
        let family = family.to_string();
        self.run(move || async move { source.get(&family).await }).await
    }

    pub async fn source_details(&self, source_id: &str, family: &str) -> Result<serde_json::Value> {
        let source = self.source(source_id)?;
        let family = family.to_string();
        self.run(move || async move { source.source_details(&family).await })
            .await
    }

    /// Acknowledges at once and delivers the family, or the error that
    /// prevented it, to `target` through the response sink later.
    pub fn get_delayed(&self, source_id: &str, family: &str, target: &str) -> Result<()> {
        if !is_valid_target(target) {
            return Err(SourceError::validation(format!("invalid reply target '{target}'")));
        }
        self.source(source_id)?;

        let service = self.clone();
        let (source_id, family, target) = (source_id.to_string(), family.to_string(), target.to_string());
        tokio::spawn(async move {
            let result = service.get(&source_id, &family).await.map_err(|e| e.to_string());
            let reply = DelayedReply {
                source_id,
                family_name: family,
                result,
            };
            if let Err(e) = service.sink.deliver(&target, reply).await {
                warn!(target = %target, error = %e, "can't deliver delayed reply");
            }
        });
        Ok(())
    }
}

impl std::fmt::Debug for SourceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceService")
            .field("sources", &self.source_ids())
            .finish()
    }
}
