//! Pull request watching.
//!
//! Each open pull request against the watched base branch is fetched as
//! `refs/pull/<n>/head` from the base remote and diffed from its merge base,
//! so base history that landed after the fork never shows up as a change.

mod github;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fontwatch_core::{
    FamilyDescriptor, FamilyDispatcher, FamilyOutcome, Result, Source, SourceError, SourceRecord, UpdateSummary,
    map_parallel, settle_all,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{CatalogCommit, catalog_family, dispatch_filtered};
use crate::diff::{changed_paths, family_dirs, tree_at_path};
use crate::error::GitError;
use crate::merge_base::merge_base;
use crate::repository::{Oid, RemoteRef};
use crate::sync::{GitFetcher, GitReferenceState};

pub use github::{GITHUB_GRAPHQL_URL, GithubClient};

/// Merge state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    /// Not computed yet by the provider.
    Unknown,
}

/// An open pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub mergeable: Mergeable,
    pub head_ref: String,
    pub head_commit: Oid,
    /// `None` when the head repository was deleted.
    pub head_repository_url: Option<String>,
}

impl PullRequest {
    /// Whether the pull request can be checked at all.
    pub fn is_watchable(&self) -> bool {
        self.mergeable != Mergeable::Conflicting && self.head_repository_url.is_some()
    }
}

/// One page of a cursor-paged listing.
#[derive(Debug, Clone, Default)]
pub struct PullRequestPage {
    pub pull_requests: Vec<PullRequest>,
    /// Cursor for the next page; `None` once the provider reports no more.
    pub next_cursor: Option<String>,
}

/// Lists open pull requests.
#[async_trait]
pub trait PullRequestProvider: Send + Sync {
    async fn open_pull_requests(
        &self,
        base_branch: &str,
        after: Option<String>,
    ) -> std::result::Result<PullRequestPage, GitError>;
}

/// Pages through every open pull request for `base_branch`.
pub async fn list_open_pull_requests(
    provider: &dyn PullRequestProvider,
    base_branch: &str,
) -> std::result::Result<Vec<PullRequest>, GitError> {
    let mut all = Vec::new();
    let mut cursor = None;
    loop {
        let page = provider.open_pull_requests(base_branch, cursor).await?;
        all.extend(page.pull_requests);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(all),
        }
    }
}

/// A family claimed by a pull request in the last pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestFamily {
    dir: String,
    number: u64,
    url: String,
    head_commit: Oid,
    head_ref: String,
    repository: String,
}

#[derive(Debug, Clone)]
struct PlannedFamily {
    /// Reported if the family fails before it could be named.
    label: String,
    claim: PullRequestFamily,
    tree: Oid,
    is_update: bool,
}

async fn build_claim(
    fetcher: &GitFetcher,
    claim: &PullRequestFamily,
    is_update: bool,
) -> std::result::Result<FamilyDescriptor, GitError> {
    let commit = fetcher.commit(&claim.head_commit).await?;
    let catalog = CatalogCommit::new(commit, claim.repository.as_str(), claim.head_ref.as_str())
        .with_pr_url(claim.url.as_str());
    let dir = claim.dir.clone();
    fetcher
        .read(move |repo| catalog_family(repo, &catalog, &dir, is_update))
        .await
}

/// Watches open pull requests against one catalog branch.
///
/// When several pull requests touch the same family only the most recently
/// created one is dispatched.
pub struct PullRequestSource {
    record: SourceRecord,
    fetcher: GitFetcher,
    base: Arc<GitReferenceState>,
    provider: Arc<dyn PullRequestProvider>,
    dispatcher: Arc<dyn FamilyDispatcher>,
    /// Family directory to the tree id last dispatched for it.
    dispatched: Arc<Mutex<HashMap<String, Oid>>>,
    /// Family name to the pull request that claimed it.
    families: Arc<RwLock<BTreeMap<String, PullRequestFamily>>>,
}

impl PullRequestSource {
    pub fn new(
        record: SourceRecord,
        fetcher: GitFetcher,
        remote_name: impl Into<String>,
        remote_url: impl Into<String>,
        base_branch: impl Into<String>,
        provider: Arc<dyn PullRequestProvider>,
        dispatcher: Arc<dyn FamilyDispatcher>,
    ) -> Self {
        let base = GitReferenceState::new(remote_name, remote_url, RemoteRef::branch(base_branch));
        Self {
            record,
            fetcher,
            base: Arc::new(base),
            provider,
            dispatcher,
            dispatched: Arc::new(Mutex::new(HashMap::new())),
            families: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn base(&self) -> &GitReferenceState {
        &self.base
    }

    /// Fetches the pull request head unless the mirror already has it.
    async fn fetch_head(&self, pr: &PullRequest) -> std::result::Result<(), GitError> {
        let reference = RemoteRef::PullRequest(pr.number);
        let local = reference.local_ref(self.base.remote_name());
        if self.fetcher.resolve(&local).await?.as_ref() == Some(&pr.head_commit) {
            debug!(pr = pr.number, commit = %pr.head_commit.short(), "head already mirrored");
            return Ok(());
        }

        let fetched = self
            .fetcher
            .fetch_ref(self.base.remote_name(), self.base.remote_url(), reference)
            .await?;
        if fetched != pr.head_commit {
            // The branch moved after the listing; the fetched head is newer.
            debug!(pr = pr.number, reported = %pr.head_commit.short(), fetched = %fetched.short(), "head moved");
        }
        Ok(())
    }

    /// Family directories a pull request changes, relative to its merge base.
    async fn pull_request_dirs(
        &self,
        base_head: &Oid,
        pr: &PullRequest,
    ) -> std::result::Result<(Oid, Vec<(String, Oid, bool)>), GitError> {
        let local = RemoteRef::PullRequest(pr.number).local_ref(self.base.remote_name());
        let head = self
            .fetcher
            .resolve(&local)
            .await?
            .ok_or_else(|| GitError::ReferenceNotFound(local.clone()))?;
        let base_head = base_head.clone();
        let commit = head.clone();

        let dirs = self
            .fetcher
            .read(move |repo| {
                let base_tree = repo.commit(&base_head)?.tree;
                let head_tree = repo.commit(&head)?.tree;
                let fork = merge_base(repo, &base_head, &head)?
                    .ok_or_else(|| GitError::git(format!("no merge base for {}", local)))?;
                let fork_tree = repo.commit(&fork)?.tree;

                let dirs = family_dirs(repo, changed_paths(repo, &fork_tree, &head_tree)?, &head_tree)?;
                let mut found = Vec::new();
                for dir in dirs {
                    let Some(tree) = tree_at_path(repo, &head_tree, &dir)? else {
                        continue;
                    };
                    let is_update = tree_at_path(repo, &base_tree, &dir)?.is_some();
                    found.push((dir, tree, is_update));
                }
                Ok(found)
            })
            .await?;
        Ok((commit, dirs))
    }

    fn claimed(&self, family: &str) -> Result<PullRequestFamily> {
        self.families
            .read()
            .get(family)
            .cloned()
            .ok_or_else(|| SourceError::family_not_found(&self.record.id, family))
    }
}

#[async_trait]
impl Source for PullRequestSource {
    fn id(&self) -> &str {
        &self.record.id
    }

    async fn init(&self) -> Result<()> {
        self.fetcher
            .ensure_remote(self.base.remote_name(), self.base.remote_url())
            .await?;
        Ok(())
    }

    async fn update(&self, force: bool) -> Result<UpdateSummary> {
        let base_head = self.fetcher.fetch(&self.base).await?;
        let branch = self.base.reference().to_string();

        let mut pull_requests = list_open_pull_requests(self.provider.as_ref(), &branch).await?;
        let listed = pull_requests.len();
        pull_requests.retain(|pr| {
            let keep = pr.is_watchable();
            if !keep {
                debug!(pr = pr.number, mergeable = ?pr.mergeable, "pull request not watchable, dropping");
            }
            keep
        });
        let open: HashSet<u64> = pull_requests.iter().map(|pr| pr.number).collect();
        self.families.write().retain(|_, claim| open.contains(&claim.number));
        // Newest first, so the first claim on a family wins.
        pull_requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        info!(
            source = %self.record.id,
            base = %base_head.short(),
            listed,
            watched = pull_requests.len(),
            "updating pull requests"
        );

        let known = if force {
            HashMap::new()
        } else {
            self.dispatched.lock().clone()
        };
        let names: HashMap<String, String> = self
            .families
            .read()
            .iter()
            .map(|(name, claim)| (claim.dir.clone(), name.clone()))
            .collect();
        let label = |dir: &str| names.get(dir).cloned().unwrap_or_else(|| dir.to_string());

        let mut outcomes: Vec<(String, Result<FamilyOutcome>)> = Vec::new();
        // Family directory to the pull request claiming it this pass.
        let mut claimed: HashMap<String, u64> = HashMap::new();
        let mut unreadable: HashSet<u64> = HashSet::new();
        let mut plan: Vec<PlannedFamily> = Vec::new();

        for pr in &pull_requests {
            let pr_label = format!("pull/{}", pr.number);
            if let Err(e) = self.fetch_head(pr).await {
                warn!(pr = pr.number, error = %e, "can't fetch pull request head");
                unreadable.insert(pr.number);
                outcomes.push((pr_label, Err(e.into())));
                continue;
            }
            let (head_commit, dirs) = match self.pull_request_dirs(&base_head, pr).await {
                Ok(found) => found,
                Err(e) => {
                    unreadable.insert(pr.number);
                    outcomes.push((pr_label, Err(e.into())));
                    continue;
                },
            };

            for (dir, tree, is_update) in dirs {
                if claimed.contains_key(&dir) {
                    debug!(pr = pr.number, family = %dir, "family claimed by a newer pull request, skipping");
                    continue;
                }
                claimed.insert(dir.clone(), pr.number);
                let claim = PullRequestFamily {
                    dir,
                    number: pr.number,
                    url: pr.url.clone(),
                    head_commit: head_commit.clone(),
                    head_ref: pr.head_ref.clone(),
                    repository: pr.head_repository_url.clone().unwrap_or_default(),
                };
                if known.get(&claim.dir) == Some(&tree) {
                    if let Some(name) = names.get(&claim.dir) {
                        self.families.write().insert(name.clone(), claim.clone());
                    }
                    outcomes.push((label(&claim.dir), Ok(FamilyOutcome::Skipped)));
                    continue;
                }
                plan.push(PlannedFamily {
                    label: label(&claim.dir),
                    claim,
                    tree,
                    is_update,
                });
            }
        }

        let labels: Vec<String> = plan.iter().map(|p| p.label.clone()).collect();
        let fetcher = self.fetcher.clone();
        let record = self.record.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatched = Arc::clone(&self.dispatched);
        let families = Arc::clone(&self.families);

        let handles = map_parallel(
            move |planned: PlannedFamily| {
                let fetcher = fetcher.clone();
                let record = record.clone();
                let dispatcher = Arc::clone(&dispatcher);
                let dispatched = Arc::clone(&dispatched);
                let families = Arc::clone(&families);
                async move {
                    let PlannedFamily {
                        label,
                        claim,
                        tree,
                        is_update,
                    } = planned;
                    let family = match build_claim(&fetcher, &claim, is_update).await {
                        Ok(family) => family,
                        Err(e) => return (label, Err(SourceError::from(e))),
                    };

                    let name = family.family_name.clone();
                    families.write().insert(name.clone(), claim.clone());
                    let outcome = dispatch_filtered(&record, &dispatcher, family).await;
                    if let Ok(FamilyOutcome::Dispatched(_)) = &outcome {
                        dispatched.lock().insert(claim.dir, tree);
                    }
                    (name, outcome)
                }
            },
            plan,
            self.fetcher.config().max_parallel_families(),
        );

        outcomes.extend(
            settle_all(handles)
                .await
                .into_iter()
                .zip(labels)
                .map(|(settled, label)| match settled {
                    Ok(outcome) => outcome,
                    Err(e) => (label, Err(SourceError::from(e))),
                }),
        );

        // Claims survive only while their pull request still changes the
        // family, or while the pull request could not be read this pass.
        self.families.write().retain(|_, claim| {
            claimed.get(&claim.dir) == Some(&claim.number) || unreadable.contains(&claim.number)
        });

        let summary = UpdateSummary::settle(&self.record.id, outcomes)?;
        self.base.advance(base_head);
        info!(
            source = %self.record.id,
            dispatched = summary.dispatched.len(),
            skipped = summary.skipped.len(),
            "pull request update finished"
        );
        Ok(summary)
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.families.read().keys().cloned().collect())
    }

    async fn get(&self, family: &str) -> Result<FamilyDescriptor> {
        let claim = self.claimed(family)?;
        let is_update = match self.base.head() {
            Some(base_head) => {
                let dir = claim.dir.clone();
                self.fetcher
                    .read(move |repo| {
                        let tree = repo.commit(&base_head)?.tree;
                        Ok(tree_at_path(repo, &tree, &dir)?.is_some())
                    })
                    .await?
            },
            None => false,
        };
        Ok(build_claim(&self.fetcher, &claim, is_update).await?)
    }

    async fn source_details(&self, family: &str) -> Result<serde_json::Value> {
        let claim = self.claimed(family)?;
        Ok(json!({
            "mode": self.record.mode,
            "pullRequest": claim,
            "base": self.base.snapshot(),
        }))
    }
}

impl std::fmt::Debug for PullRequestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullRequestSource")
            .field("id", &self.record.id)
            .field("base", &self.base.local_ref())
            .finish()
    }
}
