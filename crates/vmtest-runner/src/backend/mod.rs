//! VM backend abstraction.
//!
//! The runner never boots machines itself. It hands a [`ProvisionRequest`] to
//! a [`VmBackend`] and drives the returned [`VmInstance`] through the collect
//! phase. Dropping an in-flight `provision` future abandons the boot; backends
//! must clean up whatever they started when that happens.

mod command;

pub use command::CommandBackend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vmtest_core::{ProvisioningSpec, UnitId};

use crate::error::BackendError;

/// Everything a backend needs to boot and install one unit.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Unique instance name for this execution.
    pub name: String,
    pub unit: UnitId,
    pub spec: ProvisioningSpec,
    /// Installer config resolved against the configured config root.
    pub config_file: PathBuf,
    /// Per-unit scratch directory on the host.
    pub work_dir: PathBuf,
}

/// Result of running the collection script once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Overall exit status of the script. Informational only.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutcome {
    /// Returns true if the script exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Boots installed machines.
#[async_trait]
pub trait VmBackend: Send + Sync {
    /// Boots, installs and reboots into the target for `request`.
    async fn provision(&self, request: &ProvisionRequest) -> Result<Box<dyn VmInstance>, BackendError>;
}

/// A provisioned, running machine.
#[async_trait]
pub trait VmInstance: Send {
    /// Instance name as known to the backend.
    fn name(&self) -> &str;

    /// Guest directory substituted for `OUTPUT_COLLECT_D`.
    fn guest_output_dir(&self) -> &str;

    /// Runs the rendered collection script once.
    async fn run_script(&mut self, script: &str) -> Result<ScriptOutcome, BackendError>;

    /// Copies the contents of `guest_dir` into the host directory `dest`.
    async fn fetch_outputs(&mut self, guest_dir: &str, dest: &Path) -> Result<(), BackendError>;

    /// Tears the machine down.
    async fn release(self: Box<Self>) -> Result<(), BackendError>;
}
