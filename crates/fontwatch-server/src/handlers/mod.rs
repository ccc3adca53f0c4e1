//! HTTP handlers.

pub mod cache;
pub mod health;
pub mod metrics;
pub mod processes;
pub mod sources;
