//! Web fonts API source.
//!
//! Downloads the API document on every pass and dispatches the families
//! whose entry changed since the previous pass. Font files are downloaded
//! from the urls in the document and named after the variant.
//!
//! Every family in the API is already published, so only a family that
//! appears between two passes counts as new (`is_update == false`).
//!
//! The document becomes the baseline as soon as it is read. Families that
//! fail to dispatch are remembered and retried on the next pass.

mod config;
mod data;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fontwatch_core::{
    FamilyDescriptor, FamilyDispatcher, FamilyFile, FamilyMetadata, FamilyOutcome, LicenseDir, Report, ReportTable,
    Reporter, Result, Source, SourceError, SourceRecord, UpdateSummary, flatten, map_parallel, settle_all,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::download::Downloader;
use crate::error::ApiError;

pub use config::ApiSourceConfig;
pub use data::{ApiData, ApiFamily, font_file_name, style_name};

/// Branch name recorded for families read from the API.
const API_BRANCH: &str = "api";

struct Shared {
    record: SourceRecord,
    config: ApiSourceConfig,
    downloader: Downloader,
    dispatcher: Arc<dyn FamilyDispatcher>,
}

/// Family source backed by the web fonts API.
pub struct ApiSource {
    shared: Arc<Shared>,
    /// Document seen by the last update pass.
    last: Mutex<Option<Arc<ApiData>>>,
    /// Families whose dispatch failed, with their `is_update` flag. They
    /// are retried on the next pass whether or not the document changed.
    retry: Mutex<BTreeMap<String, bool>>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl ApiSource {
    pub fn new(record: SourceRecord, config: ApiSourceConfig, dispatcher: Arc<dyn FamilyDispatcher>) -> Self {
        let downloader = Downloader::new(config.timeout());
        Self {
            shared: Arc::new(Shared {
                record,
                config,
                downloader,
                dispatcher,
            }),
            last: Mutex::new(None),
            retry: Mutex::new(BTreeMap::new()),
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    async fn download_data(&self) -> Result<ApiData> {
        let bytes = self
            .shared
            .downloader
            .get(self.shared.config.data_url())
            .await
            .map_err(ApiError::from)?;
        Ok(ApiData::parse(&bytes)?)
    }

    /// The last pass's document, downloading a fresh one if there is none.
    async fn data(&self) -> Result<Arc<ApiData>> {
        if let Some(data) = self.previous() {
            return Ok(data);
        }
        Ok(Arc::new(self.download_data().await?))
    }

    fn previous(&self) -> Option<Arc<ApiData>> {
        self.last.lock().clone()
    }
}

impl Shared {
    /// Downloads every file of `family` and assembles its descriptor.
    async fn load(&self, family: &ApiFamily, is_update: bool) -> Result<FamilyDescriptor> {
        let mut files = Vec::new();
        for (name, url) in family.file_urls()? {
            debug!(family = %family.family, file = %name, "downloading font");
            let data = self.downloader.get(&url).await.map_err(ApiError::from)?;
            files.push(FamilyFile::new(name, data));
        }
        if files.is_empty() {
            return Err(SourceError::validation(format!(
                "family '{}' lists no files",
                family.family
            )));
        }

        let commit_date: DateTime<Utc> = family.last_modified.and_time(chrono::NaiveTime::MIN).and_utc();
        let metadata = FamilyMetadata::new(family.revision(), commit_date, self.config.public_url(), API_BRANCH)
            .with_update(is_update)
            .with_source_details(details(family));

        Ok(FamilyDescriptor::new(family.family.as_str(), files, LicenseDir::Ofl, metadata))
    }

    async fn update_family(&self, family: ApiFamily, is_update: bool) -> Result<FamilyOutcome> {
        let descriptor = self.load(&family, is_update).await?;
        let key = self.dispatcher.dispatch(&self.record.id, descriptor).await?;
        Ok(FamilyOutcome::Dispatched(key))
    }
}

fn details(family: &ApiFamily) -> serde_json::Value {
    serde_json::to_value(family).unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl Source for ApiSource {
    fn id(&self) -> &str {
        &self.shared.record.id
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, force: bool) -> Result<UpdateSummary> {
        info!(source = %self.shared.record.id, url = %self.shared.config.public_url(), force, "starting update");
        let data = Arc::new(self.download_data().await?);
        let previous = self.previous();
        let retry = self.retry.lock().clone();

        let mut table = ReportTable::new("Family Updates", ["Family Name", "Status", "Message"]);
        let mut outcomes = Vec::new();
        let mut pending = Vec::new();
        for family in data.families() {
            if !self.shared.record.allows(&family.family) {
                continue;
            }
            if let Some(&is_update) = retry.get(&family.family) {
                pending.push((family.clone(), is_update));
            } else if force || family.needs_update(previous.as_deref()) {
                let is_update = previous.as_ref().is_none_or(|previous| previous.contains(&family.family));
                pending.push((family.clone(), is_update));
            } else {
                outcomes.push((family.family.clone(), Ok(FamilyOutcome::Skipped)));
            }
        }
        *self.last.lock() = Some(Arc::clone(&data));

        let names: Vec<(String, bool)> = pending
            .iter()
            .map(|(family, is_update)| (family.family.clone(), *is_update))
            .collect();
        let shared = Arc::clone(&self.shared);
        let handles = map_parallel(
            move |(family, is_update): (ApiFamily, bool)| {
                let shared = Arc::clone(&shared);
                async move { shared.update_family(family, is_update).await }
            },
            pending,
            self.shared.config.parallel_downloads(),
        );

        let mut failed = BTreeMap::new();
        for ((name, is_update), settled) in names.into_iter().zip(settle_all(handles).await) {
            let outcome = flatten(settled);
            match &outcome {
                Ok(FamilyOutcome::Dispatched(key)) => {
                    table.push_row([name.clone(), "dispatched".into(), key.to_string()]);
                },
                Ok(FamilyOutcome::Skipped) => {},
                Err(e) => {
                    table.push_row([name.clone(), "failed".into(), e.to_string()]);
                    failed.insert(name.clone(), is_update);
                },
            }
            outcomes.push((name, outcome));
        }
        if !failed.is_empty() {
            debug!(source = %self.shared.record.id, families = ?failed.keys().collect::<Vec<_>>(), "retrying next pass");
        }
        *self.retry.lock() = failed;

        let summary = UpdateSummary::settle(&self.shared.record.id, outcomes);
        if let Some(reporter) = &self.reporter {
            let result = match &summary {
                Ok(summary) => json!({ "ok": true, "summary": summary }),
                Err(e) => json!({ "ok": false, "error": e.to_string() }),
            };
            let report = Report::start("source", &self.shared.record.id, "update")
                .finish(json!({ "tables": [table], "result": result }));
            if let Err(e) = reporter.file(report).await {
                warn!(source = %self.shared.record.id, error = %e, "can't file update report");
            }
        }
        summary
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.data().await?.names())
    }

    async fn get(&self, family: &str) -> Result<FamilyDescriptor> {
        let data = self.data().await?;
        let entry = data
            .get(family)
            .ok_or_else(|| SourceError::family_not_found(&self.shared.record.id, family))?;
        let is_update = self.previous().is_none_or(|previous| previous.contains(family));
        self.shared.load(entry, is_update).await
    }

    async fn source_details(&self, family: &str) -> Result<serde_json::Value> {
        let data = self.data().await?;
        data.get(family)
            .map(details)
            .ok_or_else(|| SourceError::family_not_found(&self.shared.record.id, family))
    }
}

impl std::fmt::Debug for ApiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSource")
            .field("id", &self.shared.record.id)
            .field("config", &self.shared.config)
            .finish()
    }
}
