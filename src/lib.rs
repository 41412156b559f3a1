//! Concurrent website availability monitor
//!
//! Probes a set of URLs at fixed intervals, aggregates the outcomes into time
//! windows, raises alerts on sustained failures and keeps a live dashboard of
//! every target. See [`actors`] for the pipeline layout and [`supervisor`]
//! for how it is run.

pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod discord;
pub mod error;
pub mod probe;
pub mod render;
pub mod storage;
pub mod supervisor;

pub use error::{PipelineError, PipelineResult};
pub use supervisor::{Pipeline, Supervisor};
