//! Single-unit execution: provision, collect, verify.
//!
//! Each phase runs under its own deadline. Once provisioning succeeds the
//! instance is released on every path out of the collect phase, including
//! failures and timeouts. Release is bounded too; an instance that does not
//! come down in time is abandoned to the backend's drop handling.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, info, warn};
use vmtest_core::{ArtifactError, ArtifactStore, TestUnit, verify};

use crate::backend::{ProvisionRequest, ScriptOutcome, VmBackend, VmInstance};
use crate::error::{BackendError, Phase, UnitError};
use crate::report::UnitOutcome;

/// Name of the artifact store directory inside a unit directory.
pub const COLLECT_DIR: &str = "collect";

/// Per-unit execution settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub provision_timeout: Duration,
    pub collect_timeout: Duration,
    pub release_timeout: Duration,
    /// Root that scenario config files are resolved against.
    pub config_root: Option<PathBuf>,
}

/// Generates a backend instance name unique to one execution.
#[must_use]
pub fn instance_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("vmtest-{}", &id[..8])
}

/// Runs `unit` to completion inside `unit_dir` and reports what happened.
///
/// Never fails: every error becomes an errored outcome.
pub async fn execute(
    backend: &dyn VmBackend,
    unit: &TestUnit,
    settings: &PipelineSettings,
    unit_dir: &Path,
) -> UnitOutcome {
    let started = Instant::now();
    let name = instance_name();
    info!(unit = %unit.id(), instance = %name, "starting unit");

    let (outcome, exit_code) = match run(backend, unit, settings, unit_dir, &name).await {
        Ok((report, script)) => (
            UnitOutcome::verified(unit.id().clone(), report),
            Some(script.exit_code),
        ),
        Err(err) => {
            warn!(unit = %unit.id(), phase = %err.phase(), error = %err, "unit errored");
            (UnitOutcome::errored(unit.id().clone(), &err), None)
        }
    };

    let outcome = outcome
        .with_instance(name)
        .with_script_exit_code(exit_code)
        .with_duration(started.elapsed());
    info!(unit = %unit.id(), status = %outcome.status, elapsed_ms = outcome.duration_ms, "unit finished");
    outcome
}

async fn run(
    backend: &dyn VmBackend,
    unit: &TestUnit,
    settings: &PipelineSettings,
    unit_dir: &Path,
    name: &str,
) -> Result<(vmtest_core::VerificationReport, ScriptOutcome), UnitError> {
    let store = ArtifactStore::create(unit_dir.join(COLLECT_DIR))
        .map_err(UnitError::artifacts(Phase::Provision))?;

    let spec = unit.spec();
    let request = ProvisionRequest {
        name: name.to_string(),
        unit: unit.id().clone(),
        spec: spec.clone(),
        config_file: settings
            .config_root
            .as_ref()
            .map_or_else(|| spec.conf_file.clone(), |root| root.join(&spec.conf_file)),
        work_dir: unit_dir.to_path_buf(),
    };

    debug!(unit = %unit.id(), "provisioning");
    let mut vm = match timeout(settings.provision_timeout, backend.provision(&request)).await {
        Err(_) => return Err(UnitError::ProvisioningTimeout(settings.provision_timeout)),
        Ok(Err(e)) => return Err(UnitError::Provisioning(e)),
        Ok(Ok(vm)) => vm,
    };

    let collected = collect(vm.as_mut(), unit, &store, unit_dir, settings.collect_timeout).await;

    let instance = vm.name().to_string();
    match timeout(settings.release_timeout, vm.release()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(unit = %unit.id(), instance = %instance, error = %e, "failed to release instance");
        }
        Err(_) => warn!(
            unit = %unit.id(),
            instance = %instance,
            limit = ?settings.release_timeout,
            "release timed out, abandoning instance"
        ),
    }

    let script = collected?;
    let report = verify(unit.id(), &unit.scenario().assertions, &store)
        .map_err(UnitError::artifacts(Phase::Verify))?;
    debug!(unit = %unit.id(), checked = report.checked, failures = report.failures.len(), "verified");
    Ok((report, script))
}

async fn collect(
    vm: &mut dyn VmInstance,
    unit: &TestUnit,
    store: &ArtifactStore,
    unit_dir: &Path,
    limit: Duration,
) -> Result<ScriptOutcome, UnitError> {
    let guest_dir = vm.guest_output_dir().to_string();
    let script = unit.scenario().collect.render(&guest_dir);
    write_file(&unit_dir.join("collect.sh"), script.as_bytes())
        .map_err(UnitError::artifacts(Phase::Collect))?;

    let phase = async {
        let outcome = vm.run_script(&script).await?;
        vm.fetch_outputs(&guest_dir, store.root()).await?;
        Ok::<_, BackendError>(outcome)
    };
    let outcome = match timeout(limit, phase).await {
        Err(_) => return Err(UnitError::CollectionTimeout(limit)),
        Ok(Err(e)) => return Err(UnitError::Collection(e)),
        Ok(Ok(outcome)) => outcome,
    };

    if !outcome.success() {
        // Individual collection commands may fail; verification decides.
        debug!(unit = %unit.id(), exit_code = outcome.exit_code, "collection script exited non-zero");
    }
    let log = format!(
        "exit code: {}\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
        outcome.exit_code, outcome.stdout, outcome.stderr
    );
    write_file(&unit_dir.join("collect.log"), log.as_bytes())
        .map_err(UnitError::artifacts(Phase::Collect))?;
    Ok(outcome)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    std::fs::write(path, contents).map_err(|source| ArtifactError::Store {
        path: path.to_path_buf(),
        source,
    })
}
