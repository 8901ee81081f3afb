//! # vmtest-runner
//!
//! Executes [`vmtest_core::TestUnit`]s against a VM backend.
//!
//! Every enabled unit goes through the same linear pipeline:
//!
//! ```text
//!   provision ──► collect ──► verify
//!   (timeout)     (timeout)   (pure, against collect/)
//! ```
//!
//! Units run concurrently up to a configured bound, each in its own
//! directory under the run directory. Per-unit failures are isolated and
//! recorded in the [`RunReport`].

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod runner;

pub use backend::{CommandBackend, ProvisionRequest, ScriptOutcome, VmBackend, VmInstance};
pub use config::{HarnessConfig, KeepPolicy, LogFormat};
pub use error::{BackendError, Phase, RunError, UnitError};
pub use report::{RunReport, Summary, UnitOutcome, UnitStatus};
pub use runner::{REPORT_FILE, RunSettings, Runner};
