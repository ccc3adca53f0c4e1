//! Tree walking and tree-to-tree diffing.
//!
//! Families live at `<licenseDir>/<family>/...` in a catalog tree. Diffs are
//! computed on path lists and collapsed to those two leading segments.

use std::collections::{BTreeMap, BTreeSet};

use fontwatch_core::LicenseDir;

use crate::error::GitError;
use crate::repository::{GitRepository, Oid, TreeEntry};

/// How a path changed between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One changed blob path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
}

/// Recursively compares two trees and returns every changed blob path.
///
/// `None` stands for an empty tree. Subtrees with equal ids are skipped
/// without being read.
pub fn diff_trees(
    repo: &dyn GitRepository,
    old: Option<&Oid>,
    new: Option<&Oid>,
) -> Result<Vec<Change>, GitError> {
    let mut changes = Vec::new();
    diff_into(repo, old, new, "", &mut changes)?;
    Ok(changes)
}

/// Changed paths between two trees, in tree order.
pub fn changed_paths(repo: &dyn GitRepository, old: &Oid, new: &Oid) -> Result<Vec<String>, GitError> {
    Ok(diff_trees(repo, Some(old), Some(new))?
        .into_iter()
        .map(|c| c.path)
        .collect())
}

fn entries_by_name(
    repo: &dyn GitRepository,
    tree: Option<&Oid>,
) -> Result<BTreeMap<String, TreeEntry>, GitError> {
    match tree {
        Some(id) => Ok(repo
            .tree(id)?
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect()),
        None => Ok(BTreeMap::new()),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn diff_into(
    repo: &dyn GitRepository,
    old: Option<&Oid>,
    new: Option<&Oid>,
    prefix: &str,
    out: &mut Vec<Change>,
) -> Result<(), GitError> {
    if old == new {
        return Ok(());
    }

    let old_entries = entries_by_name(repo, old)?;
    let new_entries = entries_by_name(repo, new)?;
    let names: BTreeSet<&String> = old_entries.keys().chain(new_entries.keys()).collect();

    for name in names {
        let path = join(prefix, name);
        match (old_entries.get(name), new_entries.get(name)) {
            (Some(o), Some(n)) if o.id == n.id && o.kind == n.kind => {},
            (Some(o), Some(n)) if o.is_tree() && n.is_tree() => {
                diff_into(repo, Some(&o.id), Some(&n.id), &path, out)?;
            },
            (Some(o), Some(n)) if o.is_tree() || n.is_tree() => {
                // A file replaced by a directory or the reverse.
                removed_or_added(repo, o, &path, ChangeKind::Removed, out)?;
                removed_or_added(repo, n, &path, ChangeKind::Added, out)?;
            },
            (Some(_), Some(_)) => out.push(Change {
                path,
                kind: ChangeKind::Modified,
            }),
            (Some(o), None) => removed_or_added(repo, o, &path, ChangeKind::Removed, out)?,
            (None, Some(n)) => removed_or_added(repo, n, &path, ChangeKind::Added, out)?,
            (None, None) => {},
        }
    }

    Ok(())
}

fn removed_or_added(
    repo: &dyn GitRepository,
    entry: &TreeEntry,
    path: &str,
    kind: ChangeKind,
    out: &mut Vec<Change>,
) -> Result<(), GitError> {
    if !entry.is_tree() {
        out.push(Change {
            path: path.to_string(),
            kind,
        });
        return Ok(());
    }
    match kind {
        ChangeKind::Removed => diff_into(repo, Some(&entry.id), None, path, out),
        _ => diff_into(repo, None, Some(&entry.id), path, out),
    }
}

/// Looks up the subtree at `path` (slash separated) below `root`.
pub fn tree_at_path(repo: &dyn GitRepository, root: &Oid, path: &str) -> Result<Option<Oid>, GitError> {
    let mut current = root.clone();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let next = repo
            .tree(&current)?
            .into_iter()
            .find(|e| e.name == segment && e.is_tree());
        match next {
            Some(entry) => current = entry.id,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Collapses changed paths to family directories (`<licenseDir>/<family>`)
/// and keeps only those still present in `new_tree`.
pub fn family_dirs<I, S>(repo: &dyn GitRepository, paths: I, new_tree: &Oid) -> Result<BTreeSet<String>, GitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let candidates: BTreeSet<String> = paths
        .into_iter()
        .filter_map(|path| {
            let mut segments = path.as_ref().split('/');
            let root = segments.next()?;
            let family = segments.next()?;
            // The path must continue below the family directory.
            segments.next()?;
            LicenseDir::is_root(root).then(|| format!("{root}/{family}"))
        })
        .collect();

    let mut present = BTreeSet::new();
    for dir in candidates {
        if tree_at_path(repo, new_tree, &dir)?.is_some() {
            present.insert(dir);
        }
    }
    Ok(present)
}

/// Every family directory under the known license roots.
pub fn all_family_dirs(repo: &dyn GitRepository, root: &Oid) -> Result<BTreeSet<String>, GitError> {
    let mut dirs = BTreeSet::new();
    for license in LicenseDir::ALL {
        let Some(license_tree) = tree_at_path(repo, root, license.as_str())? else {
            continue;
        };
        for entry in repo.tree(&license_tree)? {
            if entry.is_tree() {
                dirs.insert(format!("{}/{}", license, entry.name));
            }
        }
    }
    Ok(dirs)
}
