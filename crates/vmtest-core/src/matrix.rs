//! Scenario composition engine.
//!
//! [`Matrix::compose`] takes the Cartesian product of releases and scenarios,
//! drops pairs the scenario's distro families or the compatibility table rule
//! out, and records each remaining pair as a [`TestUnit`] keyed by its
//! [`UnitId`]. Units live in a sorted map, so iteration order and identity
//! never depend on registration order.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::compat::{CompatTable, Rule};
use crate::error::{ConfigError, Result};
use crate::id::UnitId;
use crate::provision::{self, ProvisioningSpec};
use crate::registry::Catalog;
use crate::release::ReleaseTrait;
use crate::scenario::ScenarioTrait;

/// Whether a generated unit should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Enablement {
    Enabled,
    Disabled { reason: Option<String> },
}

impl Enablement {
    /// Returns true for [`Enablement::Enabled`].
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Returns the disablement reason, if one was given.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Enabled => None,
            Self::Disabled { reason } => reason.as_deref(),
        }
    }
}

/// One release × scenario combination.
#[derive(Debug, Clone)]
pub struct TestUnit {
    id: UnitId,
    release: Arc<ReleaseTrait>,
    scenario: Arc<ScenarioTrait>,
    enablement: Enablement,
    spec: ProvisioningSpec,
}

impl TestUnit {
    fn new(release: &Arc<ReleaseTrait>, scenario: &Arc<ScenarioTrait>, enablement: Enablement) -> Self {
        Self {
            id: UnitId::new(release.id.clone(), scenario.id.clone()),
            release: Arc::clone(release),
            scenario: Arc::clone(scenario),
            enablement,
            spec: provision::build(release, scenario),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &UnitId {
        &self.id
    }

    #[must_use]
    pub fn release(&self) -> &ReleaseTrait {
        &self.release
    }

    #[must_use]
    pub fn scenario(&self) -> &ScenarioTrait {
        &self.scenario
    }

    #[must_use]
    pub const fn enablement(&self) -> &Enablement {
        &self.enablement
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enablement.is_enabled()
    }

    /// The merged provisioning spec, computed once at composition time.
    #[must_use]
    pub const fn spec(&self) -> &ProvisioningSpec {
        &self.spec
    }

    /// Returns true if `pattern` selects this unit.
    ///
    /// Accepted forms: `release/scenario`, `release/*`, `*/scenario`, a bare
    /// release id or a bare scenario id. `*` and `*/*` select every unit.
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        let release = self.id.release.as_str();
        let scenario = self.id.scenario.as_str();
        let side = |want: &str, have: &str| want == "*" || want == have;
        match pattern.split_once('/') {
            Some((r, s)) => side(r, release) && side(s, scenario),
            None => side(pattern, release) || pattern == scenario,
        }
    }
}

/// The generated set of test units.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    units: BTreeMap<UnitId, TestUnit>,
}

impl Matrix {
    /// Composes the matrix.
    ///
    /// When `config_root` is given, every scenario that produced at least one
    /// unit must reference a config file that exists under it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the table names unknown traits or a config
    /// file is missing. Either aborts the whole build.
    pub fn compose(catalog: &Catalog, compat: &CompatTable, config_root: Option<&Path>) -> Result<Self> {
        compat.validate(catalog)?;

        let mut units = BTreeMap::new();
        for release in catalog.releases() {
            for scenario in catalog.scenarios() {
                if !scenario.supports(release.distro) {
                    continue;
                }
                let id = UnitId::new(release.id.clone(), scenario.id.clone());
                let enablement = match compat.rule_for(&id) {
                    None | Some(Rule::Enabled) => Enablement::Enabled,
                    Some(Rule::Disabled { reason }) => Enablement::Disabled {
                        reason: reason.clone(),
                    },
                    Some(Rule::Incompatible) => {
                        debug!(unit = %id, "pair marked incompatible");
                        continue;
                    }
                };
                units.insert(id, TestUnit::new(release, scenario, enablement));
            }
        }

        let matrix = Self { units };
        if let Some(root) = config_root {
            matrix.check_config_files(root)?;
        }
        debug!(units = matrix.len(), enabled = matrix.enabled().count(), "matrix composed");
        Ok(matrix)
    }

    fn check_config_files(&self, root: &Path) -> Result<()> {
        let mut seen = BTreeSet::new();
        for unit in self.units.values() {
            if !seen.insert(&unit.scenario.id) {
                continue;
            }
            let path = root.join(&unit.scenario.conf_file);
            if !path.is_file() {
                return Err(ConfigError::MissingConfigFile {
                    scenario: unit.scenario.id.to_string(),
                    path,
                });
            }
        }
        Ok(())
    }

    /// Iterates over every unit in identity order.
    pub fn units(&self) -> impl Iterator<Item = &TestUnit> {
        self.units.values()
    }

    /// Iterates over enabled units.
    pub fn enabled(&self) -> impl Iterator<Item = &TestUnit> {
        self.units().filter(|u| u.is_enabled())
    }

    /// Iterates over disabled units.
    pub fn disabled(&self) -> impl Iterator<Item = &TestUnit> {
        self.units().filter(|u| !u.is_enabled())
    }

    #[must_use]
    pub fn get(&self, id: &UnitId) -> Option<&TestUnit> {
        self.units.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns the units any pattern selects; no patterns selects everything.
    #[must_use]
    pub fn select(&self, patterns: &[String]) -> Vec<&TestUnit> {
        self.units()
            .filter(|u| patterns.is_empty() || patterns.iter().any(|p| u.matches(p)))
            .collect()
    }
}
