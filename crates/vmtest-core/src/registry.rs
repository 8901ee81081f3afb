//! Trait registries.
//!
//! Traits are registered into a [`CatalogBuilder`] at startup, then frozen into
//! a read-only [`Catalog`]. The catalog hands out `Arc`s, so concurrent unit
//! executions share trait definitions without locking.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::id::{ReleaseId, ScenarioId};
use crate::release::ReleaseTrait;
use crate::scenario::ScenarioTrait;

/// Collects trait definitions and rejects duplicate identifiers.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    releases: BTreeMap<ReleaseId, Arc<ReleaseTrait>>,
    scenarios: BTreeMap<ScenarioId, Arc<ScenarioTrait>>,
}

impl CatalogBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a release trait.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateRelease`] if the identifier is taken.
    pub fn release(&mut self, release: ReleaseTrait) -> Result<&mut Self> {
        match self.releases.entry(release.id.clone()) {
            Entry::Occupied(e) => Err(ConfigError::DuplicateRelease(e.key().to_string())),
            Entry::Vacant(e) => {
                e.insert(Arc::new(release));
                Ok(self)
            }
        }
    }

    /// Registers a scenario trait.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateScenario`] if the identifier is taken.
    pub fn scenario(&mut self, scenario: ScenarioTrait) -> Result<&mut Self> {
        match self.scenarios.entry(scenario.id.clone()) {
            Entry::Occupied(e) => Err(ConfigError::DuplicateScenario(e.key().to_string())),
            Entry::Vacant(e) => {
                e.insert(Arc::new(scenario));
                Ok(self)
            }
        }
    }

    /// Freezes the registries.
    #[must_use]
    pub fn build(self) -> Catalog {
        Catalog {
            releases: self.releases,
            scenarios: self.scenarios,
        }
    }
}

/// Read-only registry of release and scenario traits.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    releases: BTreeMap<ReleaseId, Arc<ReleaseTrait>>,
    scenarios: BTreeMap<ScenarioId, Arc<ScenarioTrait>>,
}

impl Catalog {
    /// Iterates over releases ordered by identifier.
    pub fn releases(&self) -> impl Iterator<Item = &Arc<ReleaseTrait>> {
        self.releases.values()
    }

    /// Iterates over scenarios ordered by identifier.
    pub fn scenarios(&self) -> impl Iterator<Item = &Arc<ScenarioTrait>> {
        self.scenarios.values()
    }

    /// Looks up a release by identifier.
    #[must_use]
    pub fn release(&self, id: &str) -> Option<&Arc<ReleaseTrait>> {
        ReleaseId::new(id).ok().and_then(|id| self.releases.get(&id))
    }

    /// Looks up a scenario by identifier.
    #[must_use]
    pub fn scenario(&self, id: &str) -> Option<&Arc<ScenarioTrait>> {
        ScenarioId::new(id).ok().and_then(|id| self.scenarios.get(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_release_rejected() {
        let mut builder = CatalogBuilder::new();
        builder
            .release(ReleaseTrait::ubuntu("xenial", "xenial").unwrap())
            .unwrap();
        let err = builder
            .release(ReleaseTrait::ubuntu("xenial", "bionic").unwrap())
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRelease(id) if id == "xenial"));

        // the first registration is kept
        let catalog = builder.build();
        assert_eq!(catalog.release("xenial").unwrap().image.target_release, "xenial");
    }

    #[test]
    fn test_duplicate_scenario_rejected() {
        let mut builder = CatalogBuilder::new();
        builder
            .scenario(ScenarioTrait::new("basic", "a.yaml").unwrap())
            .unwrap();
        assert!(matches!(
            builder.scenario(ScenarioTrait::new("basic", "b.yaml").unwrap()),
            Err(ConfigError::DuplicateScenario(_))
        ));
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut builder = CatalogBuilder::new();
        for id in ["xenial", "bionic", "trusty"] {
            builder.release(ReleaseTrait::ubuntu(id, id).unwrap()).unwrap();
        }
        let catalog = builder.build();
        let ids: Vec<_> = catalog.releases().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["bionic", "trusty", "xenial"]);
        assert!(catalog.release("disco").is_none());
    }
}
