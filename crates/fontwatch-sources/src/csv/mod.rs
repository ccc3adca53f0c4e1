//! CSV-driven source.
//!
//! A spreadsheet lists upstream repositories, one family per row. Each
//! accepted row is fetched from its upstream and read as a family, using
//! the reference catalog (google/fonts `main`) for ancillary files and to
//! decide whether the family is new.

mod cache;
mod config;
mod data;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{
    FamilyDescriptor, FamilyDispatcher, FamilyFile, FamilyMetadata, FamilyOutcome, Report, ReportTable, Reporter,
    Result, Source, SourceError, SourceRecord, UpdateSummary, flatten, map_parallel, settle_all,
};
use fontwatch_git::diff::tree_at_path;
use fontwatch_git::materialize::{find_catalog_family, tree_files};
use fontwatch_git::{
    FamilyRequest, FamilyTree, FetcherPool, GitFetcher, GitReferenceState, MaterializedFamily, Oid, RemoteRef,
    materialize,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::download::Downloader;
use crate::metadata::{MetadataGenerator, MetadataOverrides, augment};

pub use cache::CsvCache;
pub use config::{CsvSourceConfig, CsvSourceConfigBuilder};
pub use data::{CsvData, CsvFamily, REPORT_COLUMNS, RowStatus, UpstreamType};

/// The reference catalog at one commit.
#[derive(Clone)]
struct ReferenceCatalog {
    fetcher: GitFetcher,
    root: Oid,
}

/// State shared with the per-family workers.
struct Shared {
    record: SourceRecord,
    pool: FetcherPool,
    reference: GitReferenceState,
    dispatcher: Arc<dyn FamilyDispatcher>,
    metadata: Option<Arc<dyn MetadataGenerator>>,
    /// Family key to the upstream commit last dispatched for it.
    dispatched: Mutex<HashMap<String, Oid>>,
}

/// Family source backed by a catalog spreadsheet.
pub struct CsvSource {
    shared: Arc<Shared>,
    config: CsvSourceConfig,
    cache: CsvCache,
    downloader: Downloader,
    reporter: Option<Arc<dyn Reporter>>,
}

impl CsvSource {
    pub fn new(
        record: SourceRecord,
        config: CsvSourceConfig,
        pool: FetcherPool,
        dispatcher: Arc<dyn FamilyDispatcher>,
    ) -> Self {
        let reference = GitReferenceState::new(
            config.reference_remote(),
            config.reference_url(),
            RemoteRef::branch(config.reference_branch()),
        );
        let metadata = config
            .metadata_tool()
            .map(|tool| Arc::new(tool.clone()) as Arc<dyn MetadataGenerator>);

        Self {
            shared: Arc::new(Shared {
                record,
                pool,
                reference,
                dispatcher,
                metadata,
                dispatched: Mutex::new(HashMap::new()),
            }),
            cache: CsvCache::new(config.cache_ttl()),
            downloader: Downloader::new(config.download_timeout()),
            config,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Replaces the configured metadata tool. Has no effect once an update
    /// is running.
    pub fn with_metadata_generator(mut self, generator: Arc<dyn MetadataGenerator>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metadata = Some(generator);
        }
        self
    }

    pub fn config(&self) -> &CsvSourceConfig {
        &self.config
    }

    /// Loads the sheet; `force` skips the cache.
    async fn sheet(&self, force: bool) -> Result<Arc<CsvData>> {
        let url = self.config.sheet_url();
        let data = self
            .cache
            .load(force, || async {
                let text = self.downloader.get_text(url).await?;
                CsvData::parse(&text)
            })
            .await?;
        Ok(data)
    }

    async fn row(&self, key: &str) -> Result<CsvFamily> {
        let sheet = self.sheet(false).await?;
        sheet
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::family_not_found(&self.shared.record.id, key))
    }

    async fn file_report(&self, tables: Vec<ReportTable>, outcome: &Result<UpdateSummary>) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        let result = match outcome {
            Ok(summary) => json!({ "ok": true, "summary": summary }),
            Err(e) => json!({ "ok": false, "error": e.to_string() }),
        };
        let report = Report::start("source", &self.shared.record.id, "update")
            .finish(json!({ "tables": tables, "result": result }));
        if let Err(e) = reporter.file(report).await {
            warn!(source = %self.shared.record.id, error = %e, "can't file update report");
        }
    }
}

impl Shared {
    /// Fetches the reference catalog; a failure only means every family
    /// counts as new.
    async fn reference_catalog(&self) -> Option<ReferenceCatalog> {
        let fetched = async {
            let fetcher = self.pool.fetcher(self.reference.remote_url())?;
            let head = fetcher.fetch(&self.reference).await?;
            let root = fetcher.commit(&head).await?.tree;
            Ok::<_, fontwatch_git::GitError>(ReferenceCatalog { fetcher, root })
        };
        match fetched.await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(source = %self.record.id, error = %e, "can't read the reference catalog");
                None
            },
        }
    }

    async fn fetch_upstream(&self, family: &CsvFamily) -> Result<(GitFetcher, Oid)> {
        let url = family.remote_url();
        let fetcher = self.pool.fetcher(&url)?;
        let commit = fetcher
            .fetch_ref(&family.remote_name(), &url, RemoteRef::branch(family.reference_name()))
            .await
            .inspect_err(|e| {
                error!(
                    family = %family.name,
                    remote_url = %url,
                    reference = family.reference_name(),
                    error = %e,
                    "fetch failed"
                );
            })?;
        Ok((fetcher, commit))
    }

    /// Reads the family's files at `commit` and assembles its descriptor.
    async fn build(
        &self,
        family: &CsvFamily,
        fetcher: &GitFetcher,
        commit: &Oid,
        reference: Option<&ReferenceCatalog>,
    ) -> Result<FamilyDescriptor> {
        let info = fetcher.commit(commit).await?;
        let (path, prefix) = family.font_files_location();

        let root = info.tree.clone();
        let (dir, file_prefix) = (path.clone(), prefix.clone());
        let materialized = fetcher
            .read(move |repo| {
                let tree = if dir.is_empty() {
                    Some(root.clone())
                } else {
                    tree_at_path(repo, &root, &dir)?
                };
                let Some(tree) = tree else {
                    return Ok(None);
                };
                let prefix = Some(file_prefix).filter(|p| !p.is_empty());
                let request = FamilyRequest::upstream(FamilyTree::new(tree, dir), root, prefix, None);
                materialize(repo, &request).map(Some)
            })
            .await?
            .ok_or_else(|| {
                SourceError::validation(format!(
                    "can't get entry from path `{}`; is the fontfiles prefix `{}` correct?",
                    path, family.fontfiles_prefix
                ))
            })?;

        let materialized = match reference {
            Some(reference) => self.with_reference(family, materialized, reference).await,
            None => materialized,
        };

        let is_update = materialized.is_update();
        let license_dir = materialized.license_dir;
        let target_directory = materialized.target_directory(&family.name);
        let files = match &self.metadata {
            Some(generator) => {
                let overrides = MetadataOverrides::new(&family.name, &family.genre, family.designer.clone());
                augment(generator.as_ref(), materialized.files, license_dir, is_update, &overrides).await
            },
            None => materialized.files,
        };

        let metadata = FamilyMetadata::new(info.id.as_str(), info.time, family.upstream.as_str(), family.reference_name())
            .with_update(is_update)
            .with_tree(materialized.candidate.id.as_str(), materialized.candidate.path.as_str())
            .with_target_directory(target_directory)
            .with_source_details(family.details());

        Ok(FamilyDescriptor::new(family.name.as_str(), files, license_dir, metadata))
    }

    async fn with_reference(
        &self,
        family: &CsvFamily,
        materialized: MaterializedFamily,
        reference: &ReferenceCatalog,
    ) -> MaterializedFamily {
        let root = reference.root.clone();
        let name = family.name.clone();
        let found = reference
            .fetcher
            .read(move |repo| match find_catalog_family(repo, &root, &name)? {
                Some(tree) => {
                    let files: Vec<FamilyFile> = tree_files(repo, &tree.id, |_| true)?;
                    Ok(Some((tree, files)))
                },
                None => Ok(None),
            })
            .await;

        match found {
            Ok(Some((tree, files))) => materialized.with_reference(&tree, files),
            Ok(None) => {
                debug!(family = %family.name, "not in the reference catalog");
                materialized
            },
            Err(e) => {
                info!(family = %family.name, error = %e, "can't read family from the reference catalog");
                materialized
            },
        }
    }

    /// Fetches, builds and dispatches one row during an update.
    async fn update_family(&self, family: CsvFamily, reference: Option<ReferenceCatalog>, force: bool) -> Result<FamilyOutcome> {
        let key = family.key();
        let (fetcher, commit) = self.fetch_upstream(&family).await?;

        if !force && self.dispatched.lock().get(&key) == Some(&commit) {
            debug!(family = %family.name, commit = %commit.short(), "upstream unchanged");
            return Ok(FamilyOutcome::Skipped);
        }

        let descriptor = self
            .build(&family, &fetcher, &commit, reference.as_ref())
            .await
            .inspect_err(|e| {
                let (path, _) = family.font_files_location();
                error!(
                    family = %family.name,
                    path = %path,
                    fontfiles_prefix = %family.fontfiles_prefix,
                    error = %e,
                    "can't dispatch family"
                );
            })?;

        let cache_key = self.dispatcher.dispatch(&self.record.id, descriptor).await?;
        self.dispatched.lock().insert(key, commit);
        Ok(FamilyOutcome::Dispatched(cache_key))
    }
}

#[async_trait]
impl Source for CsvSource {
    fn id(&self) -> &str {
        &self.shared.record.id
    }

    async fn init(&self) -> Result<()> {
        let fetcher = self.shared.pool.fetcher(self.shared.reference.remote_url())?;
        fetcher
            .ensure_remote(self.shared.reference.remote_name(), self.shared.reference.remote_url())
            .await?;
        Ok(())
    }

    async fn update(&self, force: bool) -> Result<UpdateSummary> {
        info!(source = %self.shared.record.id, force, "starting update");
        let sheet = match self.sheet(true).await {
            Ok(sheet) => sheet,
            Err(e) => {
                let outcome = Err(e);
                self.file_report(Vec::new(), &outcome).await;
                return outcome;
            },
        };

        let mut updates = ReportTable::new("Family Updates", REPORT_COLUMNS);
        let mut outcomes: Vec<(String, Result<FamilyOutcome>)> = Vec::new();
        let mut git_families = Vec::new();

        for family in sheet.families() {
            if !self.shared.record.allows(&family.name) {
                updates.push_row([family.name.as_str(), "skipped", "Not allowlisted."]);
                outcomes.push((family.key(), Ok(FamilyOutcome::Skipped)));
            } else if let Some(suffix) = &family.key_suffix {
                updates.push_row([family.name.clone(), "skipped".into(), format!("feature branch entry {suffix}")]);
                outcomes.push((family.key(), Ok(FamilyOutcome::Skipped)));
            } else if !family.is_git() {
                debug!(family = %family.name, upstream = %family.upstream, "skipping non-git upstream");
                updates.push_row([family.name.as_str(), "skipped", "Unknown repoType"]);
                outcomes.push((family.key(), Ok(FamilyOutcome::Skipped)));
            } else {
                git_families.push(family.clone());
            }
        }

        let reference = match git_families.is_empty() {
            true => None,
            false => self.shared.reference_catalog().await,
        };

        let keys: Vec<String> = git_families.iter().map(CsvFamily::key).collect();
        let shared = Arc::clone(&self.shared);
        let handles = map_parallel(
            move |family: CsvFamily| {
                let shared = Arc::clone(&shared);
                let reference = reference.clone();
                async move { shared.update_family(family, reference, force).await }
            },
            git_families,
            self.config.max_parallel_fetches(),
        );

        for (key, settled) in keys.into_iter().zip(settle_all(handles).await) {
            let outcome = flatten(settled);
            match &outcome {
                Ok(FamilyOutcome::Dispatched(cache_key)) => {
                    updates.push_row([key.clone(), "dispatched".into(), cache_key.to_string()]);
                },
                Ok(FamilyOutcome::Skipped) => {
                    updates.push_row([key.as_str(), "skipped", "Upstream unchanged."]);
                },
                Err(e) => updates.push_row([key.clone(), "failed".into(), e.to_string()]),
            }
            outcomes.push((key, outcome));
        }

        let summary = UpdateSummary::settle(&self.shared.record.id, outcomes);
        self.file_report(vec![sheet.report().clone(), updates], &summary).await;
        if let Ok(summary) = &summary {
            info!(
                source = %self.shared.record.id,
                dispatched = summary.dispatched.len(),
                skipped = summary.skipped.len(),
                "update finished"
            );
        }
        summary
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.sheet(false).await?.list())
    }

    async fn get(&self, family: &str) -> Result<FamilyDescriptor> {
        let row = self.row(family).await?;
        if !row.is_git() {
            return Err(SourceError::validation(format!(
                "upstream of '{}' is not a git repository: {}",
                row.name, row.upstream
            )));
        }

        let (fetcher, commit) = self.shared.fetch_upstream(&row).await?;
        let reference = self.shared.reference_catalog().await;
        self.shared.build(&row, &fetcher, &commit, reference.as_ref()).await
    }

    async fn source_details(&self, family: &str) -> Result<serde_json::Value> {
        Ok(self.row(family).await?.details())
    }
}

impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("id", &self.shared.record.id)
            .field("sheet_url", &self.config.sheet_url())
            .finish()
    }
}
