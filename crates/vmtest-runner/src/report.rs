//! Unit outcomes and the run report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vmtest_core::{AssertionFailure, UnitId, VerificationReport};

use crate::error::{Phase, RunError, UnitError};

/// Final state of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Passed,
    /// Ran to completion, but some assertion did not hold.
    Failed,
    /// Could not run to completion.
    Errored,
    /// Disabled in the compatibility table.
    Skipped,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        })
    }
}

/// Serializable form of a [`UnitError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub phase: Phase,
    pub timeout: bool,
    pub message: String,
}

impl From<&UnitError> for ErrorSummary {
    fn from(err: &UnitError) -> Self {
        Self {
            phase: err.phase(),
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

/// What happened to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    pub unit: UnitId,
    pub status: UnitStatus,
    /// Disablement reason for skipped units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Assertions evaluated; zero unless verification ran.
    pub checked: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AssertionFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    /// Overall exit status of the collection script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_exit_code: Option<i32>,
    /// Unit directory, if it was kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,
    pub duration_ms: u64,
}

impl UnitOutcome {
    fn new(unit: UnitId, status: UnitStatus) -> Self {
        Self {
            unit,
            status,
            reason: None,
            instance: None,
            checked: 0,
            failures: Vec::new(),
            error: None,
            script_exit_code: None,
            artifacts: None,
            duration_ms: 0,
        }
    }

    /// A disabled unit that was not run.
    #[must_use]
    pub fn skipped(unit: UnitId, reason: Option<String>) -> Self {
        Self {
            reason,
            ..Self::new(unit, UnitStatus::Skipped)
        }
    }

    /// A unit whose verification completed.
    #[must_use]
    pub fn verified(unit: UnitId, report: VerificationReport) -> Self {
        let status = if report.passed() {
            UnitStatus::Passed
        } else {
            UnitStatus::Failed
        };
        Self {
            checked: report.checked,
            failures: report.failures,
            ..Self::new(unit, status)
        }
    }

    /// A unit that could not complete.
    #[must_use]
    pub fn errored(unit: UnitId, err: &UnitError) -> Self {
        Self {
            error: Some(err.into()),
            ..Self::new(unit, UnitStatus::Errored)
        }
    }

    #[must_use]
    pub fn with_instance(mut self, name: impl Into<String>) -> Self {
        self.instance = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_script_exit_code(mut self, code: Option<i32>) -> Self {
        self.script_exit_code = code;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns true if the unit passed or was skipped.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, UnitStatus::Passed | UnitStatus::Skipped)
    }
}

/// Outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl Summary {
    fn tally(units: &[UnitOutcome]) -> Self {
        let mut summary = Self {
            total: units.len(),
            ..Self::default()
        };
        for unit in units {
            match unit.status {
                UnitStatus::Passed => summary.passed += 1,
                UnitStatus::Failed => summary.failed += 1,
                UnitStatus::Errored => summary.errored += 1,
                UnitStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Everything one run produced, in unit identity order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub units: Vec<UnitOutcome>,
}

impl RunReport {
    /// Builds a report, sorting `units` by identity.
    #[must_use]
    pub fn new(
        run_id: String,
        run_dir: PathBuf,
        started_at: DateTime<Utc>,
        mut units: Vec<UnitOutcome>,
    ) -> Self {
        units.sort_by(|a, b| a.unit.cmp(&b.unit));
        Self {
            run_id,
            run_dir,
            started_at,
            finished_at: Utc::now(),
            summary: Summary::tally(&units),
            units,
        }
    }

    /// Returns true if no unit failed or errored.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.summary.failed == 0 && self.summary.errored == 0
    }

    /// Looks up the outcome of one unit.
    #[must_use]
    pub fn outcome(&self, unit: &UnitId) -> Option<&UnitOutcome> {
        self.units.iter().find(|o| &o.unit == unit)
    }

    /// Writes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), RunError> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
