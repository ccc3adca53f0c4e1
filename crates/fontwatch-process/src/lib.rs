//! # fontwatch process
//!
//! Resumable, ticket-gated processes. A process waits for at most one
//! answer at a time; the answer must carry the ticket minted when it was
//! requested. Process state is a strict contract checked on every load.
//!
//! ```ignore
//! let task = TaskType::<Review>::builder("review")
//!     .on_init(|ctx, _| {
//!         ctx.expect_answer("callbackApprove", Some("uiApprove"))?;
//!         Ok(())
//!     })
//!     .callback("callbackApprove", |ctx, answer| { ctx.ok("approved"); Ok(()) })
//!     .interaction("uiApprove", |_| Interaction::new(["engineer"]).binary("ok", "Approve?"))
//!     .build()?;
//! let engine = ProcessEngine::builder(task).secret(Secret::new("s3cr3t")).build()?;
//! let step = engine.init(json!({})).await?;
//! ```

pub mod answer;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod schema;
pub mod status;
pub mod store;
pub mod task;
pub mod ticket;

pub use answer::ExpectedAnswer;
pub use engine::{ProcessEngine, ProcessEngineBuilder, Prompt, Step};
pub use error::{ProcessError, Result, StateError, TicketError};
pub use interaction::{FieldKind, Interaction, InteractionField};
pub use schema::{FieldDef, StateSchema};
pub use status::{History, Status, StatusKind};
pub use store::{MemoryProcessStore, ProcessStore, StoredProcess};
pub use task::{CommitHook, Outcome, Process, TaskContext, TaskType, TaskTypeBuilder, TracingCommitHook};
pub use ticket::{Secret, Ticket};
