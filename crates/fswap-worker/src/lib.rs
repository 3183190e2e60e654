//! Face-swap job worker.
//!
//! This crate provides:
//! - The per-job runner (target fan-out, state machine, cleanup)
//! - A job executor with bounded concurrency and cancellation
//! - Structured job logging
//! - The last-used source/target store
//! - The headless `fswap-worker` binary

pub mod config;
pub mod error;
pub mod executor;
pub mod last_used;
pub mod logging;
pub mod runner;
pub mod setup;
#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use last_used::LastUsedStore;
pub use logging::JobLogger;
pub use runner::{JobReport, JobRunner};
pub use setup::build_executor;
