//! The contract every family catalog implements.

use async_trait::async_trait;
use serde::Serialize;
use tracing::error;

use crate::error::{QueueError, Result, SourceError};
use crate::types::{CacheKey, FamilyDescriptor};

/// A family catalog watched by fontwatch.
///
/// Implementations compose shared helpers (git fetching, dispatching)
/// rather than inheriting from each other.
#[async_trait]
pub trait Source: Send + Sync {
    /// Identifier the source is registered under.
    fn id(&self) -> &str;

    /// Idempotent setup (remotes, mirrors, caches).
    async fn init(&self) -> Result<()>;

    /// Runs one synchronization pass.
    ///
    /// Resolves only after every discovered family was dispatched or
    /// failed on its own. A single failure never aborts the pass; if any
    /// family failed the pass ends in [`SourceError::PartialFailure`].
    async fn update(&self, force: bool) -> Result<UpdateSummary>;

    /// Names of the families this source knows about.
    async fn list(&self) -> Result<Vec<String>>;

    /// Fetches one family on demand, bypassing whitelist filters.
    async fn get(&self, family: &str) -> Result<FamilyDescriptor>;

    /// Opaque JSON describing where the family comes from.
    async fn source_details(&self, family: &str) -> Result<serde_json::Value>;
}

/// Turns a detected family into a cached bundle plus one job message.
#[async_trait]
pub trait FamilyDispatcher: Send + Sync {
    async fn dispatch(&self, source_id: &str, family: FamilyDescriptor) -> Result<CacheKey>;
}

/// Result of handling one family during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyOutcome {
    Dispatched(CacheKey),
    /// Nothing changed since the last pass, or another candidate won.
    Skipped,
}

/// Per-pass accounting returned by [`Source::update`].
///
/// Entries are family names. A failure that happens before the family
/// could be named is labelled with its catalog directory, or with
/// `pull/<n>` when a whole pull request could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub dispatched: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl UpdateSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of families handled in the pass.
    pub fn total(&self) -> usize {
        self.dispatched.len() + self.skipped.len() + self.failed.len()
    }

    /// Folds settled per-family outcomes into a summary.
    ///
    /// Every outcome is consumed before deciding; if at least one family
    /// failed the aggregate error names the first failure.
    pub fn settle<I>(source_id: &str, outcomes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Result<FamilyOutcome>)>,
    {
        let mut summary = Self::new();
        let mut first = None;

        for (family, outcome) in outcomes {
            match outcome {
                Ok(FamilyOutcome::Dispatched(_)) => summary.dispatched.push(family),
                Ok(FamilyOutcome::Skipped) => summary.skipped.push(family),
                Err(e) => {
                    error!(source = source_id, family = %family, error = %e, "family failed");
                    if first.is_none() {
                        first = Some(format!("{family}: {e}"));
                    }
                    summary.failed.push(family);
                },
            }
        }

        match first {
            Some(first) => Err(SourceError::PartialFailure {
                failed: summary.failed.len(),
                total: summary.total(),
                first,
            }),
            None => Ok(summary),
        }
    }
}

/// Flattens a queued source operation into a plain source result.
pub fn flatten<T>(result: std::result::Result<Result<T>, QueueError>) -> Result<T> {
    result.map_err(SourceError::from).and_then(|inner| inner)
}
