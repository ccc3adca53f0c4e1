//! Fetching and per-reference synchronization state.
//!
//! [`GitFetcher`] is the only path that mutates a repository; every source
//! composes one instead of talking to the repository directly.

mod fetcher;
mod pool;
mod state;

pub use fetcher::GitFetcher;
pub use pool::FetcherPool;
pub use state::{GitReferenceState, ReferenceSnapshot};
