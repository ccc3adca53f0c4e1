//! Catalog watching sources.
//!
//! Both watch modes read families out of a catalog repository laid out as
//! `<licenseDir>/<family>/`. They share the helpers below and differ only in
//! how they pick the commits and directories to look at.

mod branch;
pub mod pulls;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fontwatch_core::{FamilyDescriptor, FamilyDispatcher, FamilyMetadata, FamilyOutcome, SourceRecord};
use tracing::debug;

use crate::diff::{all_family_dirs, tree_at_path};
use crate::error::GitError;
use crate::materialize::{FamilyRequest, FamilyTree, materialize};
use crate::naming::{METADATA_FILE, family_name_from_filename, family_name_from_metadata, resolve_family_name};
use crate::repository::{CommitInfo, GitRepository, Oid};

pub use branch::BranchWatchSource;

/// The commit a family is read from, plus where it came from.
#[derive(Debug, Clone)]
pub struct CatalogCommit {
    pub commit: CommitInfo,
    pub repository: String,
    pub branch: String,
    pub pr_url: Option<String>,
}

impl CatalogCommit {
    pub fn new(commit: CommitInfo, repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            commit,
            repository: repository.into(),
            branch: branch.into(),
            pr_url: None,
        }
    }

    pub fn with_pr_url(mut self, url: impl Into<String>) -> Self {
        self.pr_url = Some(url.into());
        self
    }

    fn metadata(&self, family: &FamilyTree, is_update: bool) -> FamilyMetadata {
        let metadata = FamilyMetadata::new(
            self.commit.id.as_str(),
            self.commit.time,
            self.repository.as_str(),
            self.branch.as_str(),
        )
        .with_update(is_update)
        .with_tree(family.id.as_str(), family.path.as_str())
        .with_target_directory(family.path.as_str());

        match &self.pr_url {
            Some(url) => metadata.with_pr_url(url.as_str()),
            None => metadata,
        }
    }
}

/// Builds the descriptor for the family directory `dir` of a catalog commit.
pub fn catalog_family(
    repo: &dyn GitRepository,
    source: &CatalogCommit,
    dir: &str,
    is_update: bool,
) -> Result<FamilyDescriptor, GitError> {
    let tree = tree_at_path(repo, &source.commit.tree, dir)?
        .ok_or_else(|| GitError::EmptyFamily { path: dir.to_string() })?;
    let family = FamilyTree::new(tree, dir);

    let materialized = materialize(repo, &FamilyRequest::catalog(family.clone(), source.commit.tree.clone()))?;
    let family_name = resolve_family_name(&materialized.files)
        .ok_or_else(|| GitError::UnnamedFamily { path: dir.to_string() })?;

    Ok(FamilyDescriptor::new(
        family_name,
        materialized.files,
        materialized.license_dir,
        source.metadata(&family, is_update),
    ))
}

/// Applies the source whitelist and hands the family to the dispatcher.
pub async fn dispatch_filtered(
    record: &SourceRecord,
    dispatcher: &Arc<dyn FamilyDispatcher>,
    family: FamilyDescriptor,
) -> fontwatch_core::Result<FamilyOutcome> {
    if !record.allows(&family.family_name) {
        debug!(source = %record.id, family = %family.family_name, "not whitelisted, skipping");
        return Ok(FamilyOutcome::Skipped);
    }
    let key = dispatcher.dispatch(&record.id, family).await?;
    Ok(FamilyOutcome::Dispatched(key))
}

/// Labels a family directory with its indexed family name, or with the
/// directory itself when the index could not name it.
pub fn family_labels(index: &BTreeMap<String, String>) -> impl Fn(&str) -> String + '_ {
    let names: HashMap<&str, &str> = index.iter().map(|(name, dir)| (dir.as_str(), name.as_str())).collect();
    move |dir| names.get(dir).map_or_else(|| dir.to_string(), |name| name.to_string())
}

/// Family name to directory map of a catalog tree.
///
/// Names are taken from file names and `METADATA.pb` only, without reading
/// font binaries. Directories whose name can't be determined are left out.
pub fn family_index(repo: &dyn GitRepository, root: &Oid) -> Result<BTreeMap<String, String>, GitError> {
    let mut index = BTreeMap::new();

    for dir in all_family_dirs(repo, root)? {
        let Some(tree) = tree_at_path(repo, root, &dir)? else {
            continue;
        };
        let entries = repo.tree(&tree)?;

        let mut name = match entries.iter().find(|e| e.is_blob() && e.name == METADATA_FILE) {
            Some(entry) => family_name_from_metadata(&String::from_utf8_lossy(&repo.blob(&entry.id)?)),
            None => None,
        };
        if name.is_none() {
            let mut binaries: Vec<&str> = entries
                .iter()
                .filter(|e| e.is_blob() && e.name.ends_with(".ttf"))
                .map(|e| e.name.as_str())
                .collect();
            binaries.sort_unstable();
            name = binaries.into_iter().find_map(family_name_from_filename);
        }

        match name {
            Some(name) => {
                index.entry(name).or_insert(dir);
            },
            None => debug!(dir = %dir, "can't name family directory"),
        }
    }

    Ok(index)
}

/// A cached [`family_index`] for one tree.
#[derive(Debug, Default)]
pub(crate) struct IndexCache {
    cached: parking_lot::Mutex<Option<(Oid, Arc<BTreeMap<String, String>>)>>,
}

impl IndexCache {
    pub(crate) fn get(&self, root: &Oid) -> Option<Arc<BTreeMap<String, String>>> {
        match &*self.cached.lock() {
            Some((tree, index)) if tree == root => Some(Arc::clone(index)),
            _ => None,
        }
    }

    pub(crate) fn put(&self, root: Oid, index: BTreeMap<String, String>) -> Arc<BTreeMap<String, String>> {
        let index = Arc::new(index);
        *self.cached.lock() = Some((root, Arc::clone(&index)));
        index
    }
}
