//! sanebot Workers - verification worker execution
//!
//! Runs the configured external verification workers against a patch set,
//! strictly in configured order, and validates their structured output:
//! - diagnostic prefix lines are stripped and forwarded to the log
//! - a hard output-size cap degrades a flooding worker to a warning
//! - everything else that deviates from the worker contract is fatal

pub mod error;
pub mod host;
pub mod runner;
pub mod spec;

// Re-export key types
pub use error::WorkerError;
pub use host::{CommandHost, HostOutput, SystemHost};
pub use runner::{oversized_fragment, run_worker, WorkerOutcome, MAX_WORKER_OUTPUT};
pub use spec::{WorkerSet, WorkerSpec};
