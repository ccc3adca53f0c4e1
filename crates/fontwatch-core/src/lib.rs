//! Fontwatch Core - Domain types, job queue and source contracts
//!
//! This crate provides the foundational pieces shared by the fontwatch
//! synchronization engine, the source variants and the server.

pub mod error;
pub mod queue;
pub mod report;
pub mod serde_secs;
pub mod source;
pub mod types;

pub use error::{QueueError, Result, SourceError};
pub use queue::{JobHandle, JobQueue, map_parallel, settle_all};
pub use report::{Report, ReportTable, Reporter};
pub use source::{FamilyDispatcher, FamilyOutcome, Source, UpdateSummary, flatten};
pub use types::{
    CacheKey, DispatchJob, FamilyDescriptor, FamilyFile, FamilyMetadata, LicenseDir, SourceMode,
    SourceRecord, is_font_binary,
};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
