//! Bounded-concurrency execution of a selection of units.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use vmtest_core::TestUnit;

use crate::backend::VmBackend;
use crate::config::{HarnessConfig, KeepPolicy};
use crate::error::{Result, RunError};
use crate::pipeline::{self, PipelineSettings};
use crate::report::{RunReport, UnitOutcome, UnitStatus};

/// Name of the report file written into every run directory.
pub const REPORT_FILE: &str = "report.json";

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub output_dir: PathBuf,
    /// Maximum number of units in flight; zero is treated as one.
    pub concurrency: usize,
    pub keep: KeepPolicy,
    pub pipeline: PipelineSettings,
}

impl RunSettings {
    /// Derives run settings from the harness configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            concurrency: config.run.concurrency,
            keep: config.run.keep,
            pipeline: PipelineSettings {
                provision_timeout: config.run.provision_timeout(),
                collect_timeout: config.run.collect_timeout(),
                release_timeout: config.run.release_timeout(),
                config_root: config.matrix.config_root.clone(),
            },
        }
    }

    /// Overrides both phase timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, provision: Duration, collect: Duration) -> Self {
        self.pipeline.provision_timeout = provision;
        self.pipeline.collect_timeout = collect;
        self
    }

    /// Overrides the instance teardown timeout.
    #[must_use]
    pub const fn with_release_timeout(mut self, release: Duration) -> Self {
        self.pipeline.release_timeout = release;
        self
    }
}

/// Executes units against a backend.
pub struct Runner {
    backend: Arc<dyn VmBackend>,
    settings: RunSettings,
}

impl Runner {
    /// Creates a new runner.
    pub fn new(backend: Arc<dyn VmBackend>, settings: RunSettings) -> Self {
        Self { backend, settings }
    }

    /// Returns the run settings.
    #[must_use]
    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Runs `units`, skipping disabled ones, and writes the run report.
    ///
    /// Unit failures never abort the run; they are recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run directory or report cannot be written.
    pub async fn run(&self, units: &[&TestUnit]) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = format!(
            "{}-{}",
            started_at.format("%Y%m%dT%H%M%SZ"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let run_dir = self.settings.output_dir.join(&run_id);
        std::fs::create_dir_all(&run_dir).map_err(|source| RunError::Io {
            path: run_dir.clone(),
            source,
        })?;

        let (enabled, disabled): (Vec<&TestUnit>, Vec<&TestUnit>) =
            units.iter().copied().partition(|u| u.is_enabled());
        let concurrency = self.settings.concurrency.max(1);
        info!(
            run = %run_id,
            enabled = enabled.len(),
            skipped = disabled.len(),
            concurrency,
            "starting run"
        );

        let mut outcomes: Vec<UnitOutcome> = disabled
            .iter()
            .map(|u| {
                debug!(unit = %u.id(), "skipping disabled unit");
                UnitOutcome::skipped(u.id().clone(), u.enablement().reason().map(str::to_string))
            })
            .collect();

        let executed: Vec<UnitOutcome> = stream::iter(enabled)
            .map(|unit| {
                let backend = Arc::clone(&self.backend);
                let unit_dir = run_dir.join(unit.id().dir_name());
                let settings = &self.settings.pipeline;
                async move { pipeline::execute(backend.as_ref(), unit, settings, &unit_dir).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for mut outcome in executed {
            let unit_dir = run_dir.join(outcome.unit.dir_name());
            if self.keeps(outcome.status) {
                outcome.artifacts = Some(unit_dir);
            } else {
                remove_unit_dir(&unit_dir);
            }
            outcomes.push(outcome);
        }

        let report = RunReport::new(run_id, run_dir.clone(), started_at, outcomes);
        report.write(&run_dir.join(REPORT_FILE))?;
        info!(
            run = %report.run_id,
            passed = report.summary.passed,
            failed = report.summary.failed,
            errored = report.summary.errored,
            skipped = report.summary.skipped,
            "run finished"
        );
        Ok(report)
    }

    const fn keeps(&self, status: UnitStatus) -> bool {
        match self.settings.keep {
            KeepPolicy::Always => true,
            KeepPolicy::Never => false,
            KeepPolicy::OnFailure => !matches!(status, UnitStatus::Passed),
        }
    }
}

fn remove_unit_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!(path = %dir.display(), "removed unit directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove unit directory"),
    }
}
