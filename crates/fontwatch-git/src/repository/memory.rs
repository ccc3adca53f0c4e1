//! In-memory repository with scriptable remotes.
//!
//! Objects are content-addressed with sha256 over a small canonical
//! encoding, so identical trees and blobs share ids just like in git.
//! Remotes are scripted with [`MemoryRepository::publish`]; a fetch copies
//! the published commit id into the local mirror ref.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{CommitInfo, EntryKind, GitRepository, Oid, RemoteRef, TreeEntry};
use crate::error::GitError;

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit(CommitInfo),
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<Oid, Object>,
    refs: HashMap<String, Oid>,
    remotes: BTreeMap<String, String>,
    published: HashMap<(String, String), Oid>,
    failing: HashMap<String, String>,
    fetch_log: Vec<String>,
    fetch_delay: Option<Duration>,
    clock: i64,
}

/// Nested path → content map used to build trees.
enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

fn insert_node(dir: &mut BTreeMap<String, Node>, segments: &[&str], data: Vec<u8>) {
    match segments {
        [] => {},
        [name] => {
            dir.insert(name.to_string(), Node::File(data));
        },
        [name, rest @ ..] => {
            let node = dir
                .entry(name.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            match node {
                Node::Dir(children) => insert_node(children, rest, data),
                Node::File(_) => {
                    let mut children = BTreeMap::new();
                    insert_node(&mut children, rest, data);
                    *node = Node::Dir(children);
                },
            }
        },
    }
}

/// Repository kept entirely in memory.
#[derive(Debug)]
pub struct MemoryRepository {
    path: PathBuf,
    state: Mutex<MemoryState>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter on every exit path of a fetch.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn content_id(kind: &str, payload: &[u8]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    Oid::new(hex::encode(hasher.finalize()))
}

impl MemoryRepository {
    /// Creates an empty repository identified by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(MemoryState::default()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn write_blob(&self, data: impl Into<Vec<u8>>) -> Oid {
        let data = data.into();
        let id = content_id("blob", &data);
        self.state.lock().objects.insert(id.clone(), Object::Blob(data));
        id
    }

    /// Stores a tree; entries are kept sorted by name.
    pub fn write_tree(&self, mut entries: Vec<TreeEntry>) -> Oid {
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut payload = Vec::new();
        for entry in &entries {
            let kind = match entry.kind {
                EntryKind::Tree => "tree",
                EntryKind::Blob => "blob",
                EntryKind::Other => "other",
            };
            payload.extend_from_slice(format!("{kind} {} {}\n", entry.id, entry.name).as_bytes());
        }

        let id = content_id("tree", &payload);
        self.state.lock().objects.insert(id.clone(), Object::Tree(entries));
        id
    }

    /// Builds the nested trees for `path → contents` pairs and returns the
    /// root tree id.
    pub fn write_files<P, D>(&self, files: &[(P, D)]) -> Oid
    where
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let mut root = BTreeMap::new();
        for (path, data) in files {
            let segments: Vec<&str> = path.as_ref().split('/').collect();
            insert_node(&mut root, &segments, data.as_ref().to_vec());
        }
        self.write_node_tree(root)
    }

    fn write_node_tree(&self, dir: BTreeMap<String, Node>) -> Oid {
        let entries = dir
            .into_iter()
            .map(|(name, node)| match node {
                Node::File(data) => TreeEntry::new(name, self.write_blob(data), EntryKind::Blob),
                Node::Dir(children) => {
                    TreeEntry::new(name, self.write_node_tree(children), EntryKind::Tree)
                },
            })
            .collect();
        self.write_tree(entries)
    }

    /// Stores a commit. Commit times advance by one minute per commit.
    pub fn write_commit(&self, tree: &Oid, parents: &[Oid]) -> Oid {
        let mut state = self.state.lock();
        state.clock += 60;
        let time = Utc
            .timestamp_opt(1_700_000_000 + state.clock, 0)
            .single()
            .unwrap_or_default();

        let mut payload = format!("tree {tree}\n");
        for parent in parents {
            payload.push_str(&format!("parent {parent}\n"));
        }
        payload.push_str(&format!("time {}\n", time.timestamp()));

        let id = content_id("commit", payload.as_bytes());
        state.objects.insert(
            id.clone(),
            Object::Commit(CommitInfo {
                id: id.clone(),
                tree: tree.clone(),
                parents: parents.to_vec(),
                time,
            }),
        );
        id
    }

    /// Writes the files as a tree and commits it on top of `parents`.
    pub fn commit_files<P, D>(&self, parents: &[Oid], files: &[(P, D)]) -> Oid
    where
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let tree = self.write_files(files);
        self.write_commit(&tree, parents)
    }

    /// Makes the remote at `url` report `commit` for `reference`.
    pub fn publish(&self, url: &str, reference: &RemoteRef, commit: &Oid) {
        self.state
            .lock()
            .published
            .insert((url.to_string(), reference.remote_ref()), commit.clone());
    }

    /// Points a local reference at `commit` without fetching.
    pub fn set_ref(&self, name: &str, commit: &Oid) {
        self.state.lock().refs.insert(name.to_string(), commit.clone());
    }

    /// Makes every fetch from `url` fail with `message`.
    pub fn fail_fetches(&self, url: &str, message: &str) {
        self.state
            .lock()
            .failing
            .insert(url.to_string(), message.to_string());
    }

    /// Makes fetches take `delay` (interruptible).
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = Some(delay);
    }

    /// `"<url> <remote ref>"` for every fetch that reached the remote.
    pub fn fetch_log(&self) -> Vec<String> {
        self.state.lock().fetch_log.clone()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_concurrent_fetches(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.state.lock().remotes.get(name).cloned()
    }

    fn object(&self, id: &Oid) -> Result<Object, GitError> {
        self.state
            .lock()
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound(id.to_string()))
    }

    fn wait(delay: Duration, interrupt: &AtomicBool) -> Result<(), GitError> {
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            if interrupt.load(Ordering::SeqCst) {
                return Err(GitError::git("Fetch failed: interrupted"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

impl GitRepository for MemoryRepository {
    fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_remote(&self, name: &str, url: &str, allow_update: bool) -> Result<(), GitError> {
        let mut state = self.state.lock();
        match state.remotes.get(name) {
            Some(existing) if existing == url => Ok(()),
            Some(existing) if !allow_update => Err(GitError::RemoteConflict {
                name: name.to_string(),
                existing: existing.clone(),
                requested: url.to_string(),
            }),
            _ => {
                state.remotes.insert(name.to_string(), url.to_string());
                Ok(())
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

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = {
            let state = self.state.lock();
            match state.remotes.get(remote_name) {
                Some(url) if url == remote_url => {},
                Some(existing) => {
                    return Err(GitError::RemoteConflict {
                        name: remote_name.to_string(),
                        existing: existing.clone(),
                        requested: remote_url.to_string(),
                    });
                },
                None => return Err(GitError::RemoteNotFound(remote_name.to_string())),
            }
            if let Some(message) = state.failing.get(remote_url) {
                return Err(GitError::git(format!("Fetch failed: {message}")));
            }
            state.fetch_delay
        };

        if let Some(delay) = delay {
            Self::wait(delay, interrupt)?;
        }

        let mut state = self.state.lock();
        let remote_ref = reference.remote_ref();
        state.fetch_log.push(format!("{remote_url} {remote_ref}"));

        let commit = state
            .published
            .get(&(remote_url.to_string(), remote_ref.clone()))
            .cloned()
            .ok_or_else(|| GitError::ReferenceNotFound(format!("{remote_ref} at {remote_url}")))?;
        state
            .refs
            .insert(reference.local_ref(remote_name), commit.clone());
        Ok(commit)
    }

    fn resolve(&self, reference: &str) -> Result<Option<Oid>, GitError> {
        Ok(self.state.lock().refs.get(reference).cloned())
    }

    fn commit(&self, id: &Oid) -> Result<CommitInfo, GitError> {
        match self.object(id)? {
            Object::Commit(info) => Ok(info),
            _ => Err(GitError::ObjectNotFound(id.to_string())),
        }
    }

    fn tree(&self, id: &Oid) -> Result<Vec<TreeEntry>, GitError> {
        match self.object(id)? {
            Object::Tree(entries) => Ok(entries),
            _ => Err(GitError::ObjectNotFound(id.to_string())),
        }
    }

    fn blob(&self, id: &Oid) -> Result<Vec<u8>, GitError> {
        match self.object(id)? {
            Object::Blob(data) => Ok(data),
            _ => Err(GitError::ObjectNotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_shares_ids() {
        let repo = MemoryRepository::new("/mem");
        let a = repo.write_files(&[("ofl/a/A.ttf", b"x".as_slice())]);
        let b = repo.write_files(&[("ofl/a/A.ttf", b"x".as_slice())]);
        let c = repo.write_files(&[("ofl/a/A.ttf", b"y".as_slice())]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_nested_trees() {
        let repo = MemoryRepository::new("/mem");
        let root = repo.write_files(&[
            ("ofl/testsans/TestSans-Regular.ttf", "glyphs"),
            ("ofl/testsans/METADATA.pb", "name: \"Test Sans\""),
            ("README.md", "hi"),
        ]);

        let entries = repo.tree(&root).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "ofl"]);
        assert!(entries[1].is_tree());

        let ofl = repo.tree(&entries[1].id).unwrap();
        let family = repo.tree(&ofl[0].id).unwrap();
        assert_eq!(family.len(), 2);
        assert_eq!(repo.blob(&family[1].id).unwrap(), b"glyphs");
    }

    #[test]
    fn test_scripted_fetch() {
        let repo = MemoryRepository::new("/mem");
        let commit = repo.commit_files(&[], &[("ofl/a/A.ttf", "x")]);
        let url = "https://github.com/google/fonts.git";
        repo.publish(url, &RemoteRef::branch("main"), &commit);
        repo.ensure_remote("google/fonts", url, false).unwrap();

        let fetched = repo
            .fetch("google/fonts", url, &RemoteRef::branch("main"), &AtomicBool::new(false))
            .unwrap();
        assert_eq!(fetched, commit);
        assert_eq!(
            repo.resolve("refs/remotes/google/fonts/main").unwrap(),
            Some(commit)
        );
        assert_eq!(repo.fetch_log(), vec![format!("{url} refs/heads/main")]);

        let err = repo
            .fetch("google/fonts", url, &RemoteRef::branch("gone"), &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, GitError::ReferenceNotFound(_)));
    }

    #[test]
    fn test_interrupted_fetch() {
        let repo = MemoryRepository::new("/mem");
        repo.ensure_remote("origin", "u", false).unwrap();
        repo.set_fetch_delay(Duration::from_secs(5));

        let err = repo
            .fetch("origin", "u", &RemoteRef::branch("main"), &AtomicBool::new(true))
            .unwrap_err();
        assert!(err.to_string().contains("interrupted"));
    }
}
