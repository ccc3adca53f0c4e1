//! # fontwatch server
//!
//! Turns detected families into cached bundles plus durable jobs, fronts
//! the sources with the source service, runs the family review process and
//! exposes all of it over HTTP.
//!
//! ## Routes
//!
//! | Method | Path                                          | Purpose                     |
//! |--------|-----------------------------------------------|-----------------------------|
//! | GET    | `/health`                                     | liveness and source ids     |
//! | GET    | `/metrics`                                    | Prometheus metrics          |
//! | POST   | `/sources/poke`                               | schedule update passes      |
//! | GET    | `/sources/{source}/families`                  | list families               |
//! | GET    | `/sources/{source}/families/{family}`         | fetch one family            |
//! | GET    | `/sources/{source}/families/{family}/details` | where the family comes from |
//! | POST   | `/sources/{source}/families/{family}/delayed` | fetch later, reply to target|
//! | POST   | `/processes`                                  | start a family review       |
//! | GET    | `/processes/{id}`                             | review state and prompt     |
//! | POST   | `/processes/{id}/execute`                     | answer a prompt             |

pub mod bootstrap;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod publish;
pub mod report;
pub mod review;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod settings;
pub mod state;

pub use bootstrap::{App, BootstrapError, build};
pub use cache::{CacheClient, CacheConfig, MemoryCache};
pub use dispatch::{DispatchConfig, Dispatcher, encode_bundle};
pub use error::AppError;
pub use publish::{ChannelPublisher, FilePublisher, JOB_QUEUE, JobPublisher};
pub use review::{FamilyReview, ReviewEngine, review_task};
pub use scheduler::{PollConfig, PollHandle, PollScheduler};
pub use server::{create_router, run_server};
pub use service::{ChannelSink, ResponseSink, SourceService};
pub use settings::Settings;
pub use state::AppState;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
