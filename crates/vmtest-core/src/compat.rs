//! Declarative compatibility table.
//!
//! Every release × scenario pair whose distro family the scenario supports is
//! enabled unless a rule says otherwise. Rules are matched in table order and
//! the last match wins, so overrides loaded from configuration can be appended
//! after the built-in rules.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::id::{ReleaseId, ScenarioId, UnitId};
use crate::registry::Catalog;

/// What a rule does to the pairs it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Rule {
    /// Generate the unit and run it.
    Enabled,
    /// Generate the unit but skip it, optionally saying why.
    Disabled {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Do not generate the unit at all.
    Incompatible,
}

/// One row of the table. An unset side matches every identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatEntry {
    #[serde(default)]
    pub release: Option<ReleaseId>,
    #[serde(default)]
    pub scenario: Option<ScenarioId>,
    #[serde(flatten)]
    pub rule: Rule,
}

impl CompatEntry {
    fn matches(&self, unit: &UnitId) -> bool {
        self.release.as_ref().is_none_or(|r| *r == unit.release)
            && self.scenario.as_ref().is_none_or(|s| *s == unit.scenario)
    }
}

/// Ordered list of compatibility rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompatTable {
    entries: Vec<CompatEntry>,
}

impl CompatTable {
    /// Creates an empty table: every supported pair is enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables one pair.
    ///
    /// # Errors
    ///
    /// Returns an error if either identifier is invalid.
    pub fn disable(self, release: &str, scenario: &str, reason: Option<&str>) -> Result<Self> {
        self.push(
            Some(release),
            Some(scenario),
            Rule::Disabled {
                reason: reason.map(str::to_string),
            },
        )
    }

    /// Declares one pair incompatible.
    ///
    /// # Errors
    ///
    /// Returns an error if either identifier is invalid.
    pub fn incompatible(self, release: &str, scenario: &str) -> Result<Self> {
        self.push(Some(release), Some(scenario), Rule::Incompatible)
    }

    /// Appends a rule; `None` on either side matches everything.
    ///
    /// # Errors
    ///
    /// Returns an error if either identifier is invalid.
    pub fn push(mut self, release: Option<&str>, scenario: Option<&str>, rule: Rule) -> Result<Self> {
        self.entries.push(CompatEntry {
            release: release.map(ReleaseId::new).transpose()?,
            scenario: scenario.map(ScenarioId::new).transpose()?,
            rule,
        });
        Ok(self)
    }

    /// Appends every rule of `other` after this table's rules.
    #[must_use]
    pub fn extended(mut self, other: impl IntoIterator<Item = CompatEntry>) -> Self {
        self.entries.extend(other);
        self
    }

    /// Returns the rules in match order.
    #[must_use]
    pub fn entries(&self) -> &[CompatEntry] {
        &self.entries
    }

    /// Returns the last rule matching `unit`, if any.
    #[must_use]
    pub fn rule_for(&self, unit: &UnitId) -> Option<&Rule> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.matches(unit))
            .map(|entry| &entry.rule)
    }

    /// Checks that every identifier the table names is registered.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRelease`] or [`ConfigError::UnknownScenario`].
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        for entry in &self.entries {
            if let Some(release) = &entry.release {
                if catalog.release(release.as_str()).is_none() {
                    return Err(ConfigError::UnknownRelease(release.to_string()));
                }
            }
            if let Some(scenario) = &entry.scenario {
                if catalog.scenario(scenario.as_str()).is_none() {
                    return Err(ConfigError::UnknownScenario(scenario.to_string()));
                }
            }
        }
        Ok(())
    }
}
