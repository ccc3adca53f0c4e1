//! On-disk repository using gix (pure Rust).

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use gix::bstr::ByteSlice;
use gix::objs::tree::EntryKind as GixEntryKind;
use gix::remote::Direction;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{CommitInfo, EntryKind, GitRepository, Oid, RemoteRef, TreeEntry};
use crate::error::GitError;

/// A bare mirror repository on disk.
///
/// Keeps one shared handle; it is reopened after remote config edits so
/// later operations see them.
pub struct GixRepository {
    path: PathBuf,
    shared: RwLock<gix::ThreadSafeRepository>,
}

impl GixRepository {
    /// Opens the bare repository at `path`, creating it if missing.
    pub fn open_or_init(path: impl Into<PathBuf>) -> Result<Self, GitError> {
        let path = path.into();

        let repo = if path.exists() {
            debug!(path = %path.display(), "opening repository");
            Self::open(&path)?
        } else {
            std::fs::create_dir_all(&path)?;
            info!(path = %path.display(), "initializing bare repository");
            gix::init_bare(&path)
                .map_err(|e| GitError::git(format!("Failed to init repo: {}", e)))?
        };

        Ok(Self {
            path,
            shared: RwLock::new(repo.into_sync()),
        })
    }

    fn local(&self) -> gix::Repository {
        self.shared.read().to_thread_local()
    }

    fn reload(&self) -> Result<(), GitError> {
        let repo = Self::open(&self.path)?;
        *self.shared.write() = repo.into_sync();
        Ok(())
    }

    fn open(path: &Path) -> Result<gix::Repository, GitError> {
        gix::open(path).map_err(|e| GitError::git(format!("Failed to open repo: {}", e)))
    }

    fn object_id(id: &Oid) -> Result<gix::ObjectId, GitError> {
        gix::ObjectId::from_hex(id.as_str().as_bytes())
            .map_err(|_| GitError::ObjectNotFound(id.to_string()))
    }

    fn remote_url(repo: &gix::Repository, name: &str) -> Option<String> {
        let remote = repo.find_remote(name).ok()?;
        remote
            .url(Direction::Fetch)
            .map(|url| url.to_bstring().to_string())
    }

    fn save_remote(repo: &gix::Repository, name: &str, url: &str) -> Result<(), GitError> {
        let config_path = repo.git_dir().join("config");
        let mut config = gix::config::File::from_path_no_includes(
            config_path.clone(),
            gix::config::Source::Local,
        )
        .map_err(|e| GitError::git(format!("Failed to read config: {}", e)))?;

        let mut remote = repo
            .remote_at(url)
            .map_err(|e| GitError::git(format!("Invalid URL '{}': {}", url, e)))?;
        remote
            .save_as_to(name, &mut config)
            .map_err(|e| GitError::git(format!("Failed to save remote '{}': {}", name, e)))?;

        let mut out = Vec::new();
        config.write_to(&mut out)?;
        std::fs::write(&config_path, out)?;
        Ok(())
    }
}

impl std::fmt::Debug for GixRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GixRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl GitRepository for GixRepository {
    fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_remote(&self, name: &str, url: &str, allow_update: bool) -> Result<(), GitError> {
        let repo = self.local();

        match Self::remote_url(&repo, name) {
            Some(existing) if existing == url => Ok(()),
            Some(existing) if !allow_update => Err(GitError::RemoteConflict {
                name: name.to_string(),
                existing,
                requested: url.to_string(),
            }),
            Some(existing) => {
                info!(remote = name, from = %existing, to = url, "updating remote url");
                Self::save_remote(&repo, name, url)?;
                self.reload()
            },
            None => {
                debug!(remote = name, url, "adding remote");
                Self::save_remote(&repo, name, url)?;
                self.reload()
            },
        }
    }

    fn fetch(
        &self,
        remote_name: &str,
        remote_url: &str,
        reference: &RemoteRef,
        interrupt: &AtomicBool,
    ) -> Result<Oid, GitError> {
        reference.validate()?;
        let repo = self.local();

        match Self::remote_url(&repo, remote_name) {
            Some(existing) if existing == remote_url => {},
            Some(existing) => {
                return Err(GitError::RemoteConflict {
                    name: remote_name.to_string(),
                    existing,
                    requested: remote_url.to_string(),
                });
            },
            None => return Err(GitError::RemoteNotFound(remote_name.to_string())),
        }

        // Fetch exactly one reference, not the remote's configured refspecs.
        let refspec = reference.fetch_refspec(remote_name);
        let remote = repo
            .remote_at(remote_url)
            .map_err(|e| GitError::git(format!("Invalid URL '{}': {}", remote_url, e)))?
            .with_refspecs([refspec.as_str()], Direction::Fetch)
            .map_err(|e| GitError::git(format!("Invalid refspec '{}': {}", refspec, e)))?;

        let outcome = remote
            .connect(Direction::Fetch)
            .map_err(|e| GitError::git(format!("Failed to connect: {}", e)))?
            .prepare_fetch(gix::progress::Discard, Default::default())
            .map_err(|e| GitError::git(format!("Failed to prepare fetch: {}", e)))?
            .receive(gix::progress::Discard, interrupt)
            .map_err(|e| GitError::git(format!("Fetch failed: {}", e)))?;

        if outcome.ref_map.mappings.is_empty() {
            return Err(GitError::ReferenceNotFound(format!(
                "{} at {}",
                reference.remote_ref(),
                remote_url
            )));
        }

        let local_ref = reference.local_ref(remote_name);
        self.resolve(&local_ref)?
            .ok_or(GitError::ReferenceNotFound(local_ref))
    }

    fn resolve(&self, reference: &str) -> Result<Option<Oid>, GitError> {
        let repo = self.local();

        let Some(found) = repo
            .try_find_reference(reference)
            .map_err(|e| GitError::git(format!("Failed to look up '{}': {}", reference, e)))?
        else {
            return Ok(None);
        };

        let id = found
            .into_fully_peeled_id()
            .map_err(|e| GitError::git(format!("Failed to peel reference: {}", e)))?;
        Ok(Some(Oid::new(id.to_string())))
    }

    fn commit(&self, id: &Oid) -> Result<CommitInfo, GitError> {
        let repo = self.local();
        let commit = repo
            .find_commit(Self::object_id(id)?)
            .map_err(|_| GitError::ObjectNotFound(id.to_string()))?;

        let tree = commit
            .tree_id()
            .map_err(|e| GitError::git(format!("Failed to read commit {}: {}", id, e)))?;
        let time = commit
            .time()
            .map_err(|e| GitError::git(format!("Failed to read commit {}: {}", id, e)))?;

        Ok(CommitInfo {
            id: id.clone(),
            tree: Oid::new(tree.to_string()),
            parents: commit
                .parent_ids()
                .map(|parent| Oid::new(parent.to_string()))
                .collect(),
            time: DateTime::<Utc>::from_timestamp(time.seconds, 0).unwrap_or_default(),
        })
    }

    fn tree(&self, id: &Oid) -> Result<Vec<TreeEntry>, GitError> {
        let repo = self.local();
        let tree = repo
            .find_tree(Self::object_id(id)?)
            .map_err(|_| GitError::ObjectNotFound(id.to_string()))?;

        let mut entries = Vec::new();
        for entry in tree.iter() {
            let entry =
                entry.map_err(|e| GitError::git(format!("Corrupt tree {}: {}", id, e)))?;
            let kind = match entry.mode().kind() {
                GixEntryKind::Tree => EntryKind::Tree,
                GixEntryKind::Blob | GixEntryKind::BlobExecutable => EntryKind::Blob,
                _ => EntryKind::Other,
            };
            entries.push(TreeEntry::new(
                entry.filename().to_str_lossy().into_owned(),
                Oid::new(entry.oid().to_string()),
                kind,
            ));
        }

        Ok(entries)
    }

    fn blob(&self, id: &Oid) -> Result<Vec<u8>, GitError> {
        let repo = self.local();
        let object = repo
            .find_object(Self::object_id(id)?)
            .map_err(|_| GitError::ObjectNotFound(id.to_string()))?;

        if object.kind != gix::object::Kind::Blob {
            return Err(GitError::ObjectNotFound(id.to_string()));
        }
        Ok(object.detach().data)
    }
}
