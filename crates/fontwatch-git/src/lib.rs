//! # fontwatch git engine
//!
//! Watches font catalog repositories and turns detected family changes into
//! dispatchable [`FamilyDescriptor`](fontwatch_core::FamilyDescriptor)s.
//!
//! ## Features
//!
//! - Pure Rust repository access via gix, plus an in-memory repository
//! - At most one fetch or remote edit in flight per repository
//! - Incremental tree diffing collapsed to family directories
//! - Pull request diffing from the merge base
//! - Branch-watch and pull-request-watch [`Source`](fontwatch_core::Source)s
//!
//! ## Example
//!
//! ```ignore
//! use fontwatch_git::{BranchWatchSource, FetchConfig, GitFetcher, GixRepository};
//!
//! let config = FetchConfig::builder()
//!     .repositories_dir("/var/lib/fontwatch/git")
//!     .build()?;
//! let url = "https://github.com/google/fonts.git";
//! let repo = Arc::new(GixRepository::open_or_init(config.repository_path(url))?);
//! let fetcher = GitFetcher::new(repo, queue.clone(), config);
//!
//! let source = BranchWatchSource::new(record, fetcher, "google/fonts", url, "main", dispatcher);
//! source.init().await?;
//! let summary = source.update(false).await?;
//! ```

pub mod diff;
pub mod error;
pub mod materialize;
pub mod merge_base;
pub mod naming;
pub mod repository;
pub mod sync;
pub mod watch;

// Re-exports
pub use error::GitError;
pub use materialize::{FamilyRequest, FamilyTree, MaterializedFamily, materialize};
pub use merge_base::merge_base;
pub use repository::{
    CommitInfo, FetchConfig, FetchConfigBuilder, GitRepository, GixRepository, MemoryRepository, Oid, RemoteRef,
    TreeEntry, repository_directory,
};
pub use sync::{FetcherPool, GitFetcher, GitReferenceState, ReferenceSnapshot};
pub use watch::pulls::{
    GithubClient, Mergeable, PullRequest, PullRequestPage, PullRequestProvider, PullRequestSource,
};
pub use watch::{BranchWatchSource, CatalogCommit};

// Re-export fontwatch_core for consumers
pub use fontwatch_core;
