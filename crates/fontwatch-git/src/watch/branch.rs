//! Branch watching.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{
    FamilyDescriptor, FamilyDispatcher, FamilyOutcome, Result, Source, SourceError, SourceRecord, UpdateSummary,
    flatten, map_parallel, settle_all,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info};

use super::{CatalogCommit, IndexCache, catalog_family, dispatch_filtered, family_index, family_labels};
use crate::diff::{all_family_dirs, changed_paths, family_dirs, tree_at_path};
use crate::repository::{CommitInfo, Oid, RemoteRef};
use crate::sync::{GitFetcher, GitReferenceState};

/// A family directory that needs to be (re)dispatched.
#[derive(Debug, Clone)]
struct PlannedFamily {
    dir: String,
    tree: Oid,
    is_update: bool,
}

/// Watches one branch of a catalog repository.
///
/// The first pass dispatches every family directory. Later passes diff the
/// last settled commit against the new head, and a family whose directory
/// tree is unchanged since it was last dispatched is skipped unless forced.
pub struct BranchWatchSource {
    record: SourceRecord,
    fetcher: GitFetcher,
    state: Arc<GitReferenceState>,
    dispatcher: Arc<dyn FamilyDispatcher>,
    /// Family directory to the tree id last dispatched for it.
    dispatched: Arc<Mutex<HashMap<String, Oid>>>,
    index: IndexCache,
}

impl BranchWatchSource {
    pub fn new(
        record: SourceRecord,
        fetcher: GitFetcher,
        remote_name: impl Into<String>,
        remote_url: impl Into<String>,
        branch: impl Into<String>,
        dispatcher: Arc<dyn FamilyDispatcher>,
    ) -> Self {
        let state = GitReferenceState::new(remote_name, remote_url, RemoteRef::branch(branch));
        Self {
            record,
            fetcher,
            state: Arc::new(state),
            dispatcher,
            dispatched: Arc::new(Mutex::new(HashMap::new())),
            index: IndexCache::default(),
        }
    }

    pub fn state(&self) -> &GitReferenceState {
        &self.state
    }

    async fn current_head(&self) -> Result<Oid> {
        match self.state.head() {
            Some(head) => Ok(head),
            None => Ok(self.fetcher.fetch(&self.state).await?),
        }
    }

    async fn index_at(&self, head: &Oid) -> Result<Arc<BTreeMap<String, String>>> {
        if let Some(index) = self.index.get(head) {
            return Ok(index);
        }
        let commit = self.fetcher.commit(head).await?;
        let index = self.fetcher.read(move |repo| family_index(repo, &commit.tree)).await?;
        Ok(self.index.put(head.clone(), index))
    }

    async fn family_dir(&self, family: &str) -> Result<(Oid, String)> {
        let head = self.current_head().await?;
        let index = self.index_at(&head).await?;
        match index.get(family) {
            Some(dir) => Ok((head, dir.clone())),
            None => Err(SourceError::family_not_found(&self.record.id, family)),
        }
    }

    fn catalog_commit(&self, commit: CommitInfo) -> CatalogCommit {
        CatalogCommit::new(commit, self.state.remote_url(), self.state.reference().to_string())
    }
}

#[async_trait]
impl Source for BranchWatchSource {
    fn id(&self) -> &str {
        &self.record.id
    }

    async fn init(&self) -> Result<()> {
        self.fetcher
            .ensure_remote(self.state.remote_name(), self.state.remote_url())
            .await?;
        Ok(())
    }

    async fn update(&self, force: bool) -> Result<UpdateSummary> {
        let previous = self.state.last_seen_commit();
        let head = self.fetcher.fetch(&self.state).await?;

        if !force && previous.as_ref() == Some(&head) {
            debug!(source = %self.record.id, commit = %head.short(), "no new commits");
            return Ok(UpdateSummary::new());
        }

        let known = if force {
            HashMap::new()
        } else {
            self.dispatched.lock().clone()
        };

        let target = head.clone();
        let (commit, plan, unchanged) = self
            .fetcher
            .read(move |repo| {
                let commit = repo.commit(&target)?;
                let previous_tree = match &previous {
                    Some(previous) => Some(repo.commit(previous)?.tree),
                    None => None,
                };

                let dirs = match &previous_tree {
                    Some(old) if !force => {
                        family_dirs(repo, changed_paths(repo, old, &commit.tree)?, &commit.tree)?
                    },
                    _ => all_family_dirs(repo, &commit.tree)?,
                };

                let mut plan = Vec::new();
                let mut unchanged = Vec::new();
                for dir in dirs {
                    let Some(tree) = tree_at_path(repo, &commit.tree, &dir)? else {
                        continue;
                    };
                    if known.get(&dir) == Some(&tree) {
                        unchanged.push(dir);
                        continue;
                    }
                    let is_update = match &previous_tree {
                        Some(old) => tree_at_path(repo, old, &dir)?.is_some(),
                        None => false,
                    };
                    plan.push(PlannedFamily { dir, tree, is_update });
                }
                Ok((commit, plan, unchanged))
            })
            .await?;

        info!(
            source = %self.record.id,
            commit = %head.short(),
            families = plan.len(),
            unchanged = unchanged.len(),
            force,
            "updating branch"
        );

        let index = self.index_at(&head).await?;
        let label = family_labels(&index);
        let names: Vec<String> = plan.iter().map(|p| label(&p.dir)).collect();

        let catalog = Arc::new(self.catalog_commit(commit));
        let fetcher = self.fetcher.clone();
        let record = self.record.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatched = Arc::clone(&self.dispatched);

        let handles = map_parallel(
            move |planned: PlannedFamily| {
                let fetcher = fetcher.clone();
                let catalog = Arc::clone(&catalog);
                let record = record.clone();
                let dispatcher = Arc::clone(&dispatcher);
                let dispatched = Arc::clone(&dispatched);
                async move {
                    let PlannedFamily { dir, tree, is_update } = planned;
                    let path = dir.clone();
                    let family = fetcher
                        .read(move |repo| catalog_family(repo, &catalog, &path, is_update))
                        .await?;

                    let outcome = dispatch_filtered(&record, &dispatcher, family).await?;
                    if let FamilyOutcome::Dispatched(_) = &outcome {
                        dispatched.lock().insert(dir, tree);
                    }
                    Ok::<_, SourceError>(outcome)
                }
            },
            plan,
            self.fetcher.config().max_parallel_families(),
        );

        let mut outcomes: Vec<(String, Result<FamilyOutcome>)> = names
            .into_iter()
            .zip(settle_all(handles).await)
            .map(|(name, settled)| (name, flatten(settled)))
            .collect();
        outcomes.extend(unchanged.iter().map(|dir| (label(dir), Ok(FamilyOutcome::Skipped))));

        let summary = UpdateSummary::settle(&self.record.id, outcomes)?;
        self.state.advance(head);
        info!(
            source = %self.record.id,
            dispatched = summary.dispatched.len(),
            skipped = summary.skipped.len(),
            "branch update finished"
        );
        Ok(summary)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let head = self.current_head().await?;
        Ok(self.index_at(&head).await?.keys().cloned().collect())
    }

    async fn get(&self, family: &str) -> Result<FamilyDescriptor> {
        let (head, dir) = self.family_dir(family).await?;
        let previous = self.state.last_seen_commit();
        let commit = self.fetcher.commit(&head).await?;
        let catalog = self.catalog_commit(commit);

        let descriptor = self
            .fetcher
            .read(move |repo| {
                // Same baseline as a pass would use: the last settled commit,
                // or the head's parent once the head itself is settled.
                let baseline = match previous {
                    Some(previous) if previous == catalog.commit.id => catalog.commit.parents.first().cloned(),
                    previous => previous,
                };
                let is_update = match baseline {
                    Some(baseline) => {
                        let old = repo.commit(&baseline)?.tree;
                        tree_at_path(repo, &old, &dir)?.is_some()
                    },
                    None => false,
                };
                catalog_family(repo, &catalog, &dir, is_update)
            })
            .await?;
        Ok(descriptor)
    }

    async fn source_details(&self, family: &str) -> Result<serde_json::Value> {
        let (_, dir) = self.family_dir(family).await?;
        Ok(json!({
            "mode": self.record.mode,
            "familyPath": dir,
            "reference": self.state.snapshot(),
        }))
    }
}

impl std::fmt::Debug for BranchWatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchWatchSource")
            .field("id", &self.record.id)
            .field("reference", &self.state.local_ref())
            .finish()
    }
}
