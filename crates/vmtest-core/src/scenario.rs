//! Scenario traits: one category of installer test.
//!
//! A scenario names the installer config it feeds to the target, the extra
//! boot parameters and disk topology it needs, the collection commands that
//! extract evidence, and the assertions judging that evidence.
//!
//! Specialised scenarios are derived from a base with [`ScenarioTrait::derive`].
//! Derivation copies the base and the builder methods only append, so a
//! derived collection script always starts with the base script.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::collect::{CollectScript, CommandBlock};
use crate::error::Result;
use crate::id::ScenarioId;
use crate::release::Distro;
use crate::topology::DiskOverrides;
use crate::verify::Assertion;

/// Reusable description of one test scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioTrait {
    pub id: ScenarioId,
    pub description: String,
    /// Installer configuration, relative to the configured config root.
    pub conf_file: PathBuf,
    /// Kernel arguments appended after the release defaults.
    pub kernel_args: Vec<String>,
    /// Topology overrides applied over the release defaults.
    pub disks: DiskOverrides,
    pub collect: CollectScript,
    pub assertions: Vec<Assertion>,
    /// Distro families this scenario can run against.
    pub distros: BTreeSet<Distro>,
}

impl ScenarioTrait {
    /// Creates a scenario that supports every distro family.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a valid identifier.
    pub fn new(id: &str, conf_file: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            id: ScenarioId::new(id)?,
            description: String::new(),
            conf_file: conf_file.into(),
            kernel_args: Vec::new(),
            disks: DiskOverrides::default(),
            collect: CollectScript::new(),
            assertions: Vec::new(),
            distros: [Distro::Ubuntu, Distro::Centos].into_iter().collect(),
        })
    }

    /// Copies this scenario under a new identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a valid identifier.
    pub fn derive(&self, id: &str) -> Result<Self> {
        let mut derived = self.clone();
        derived.id = ScenarioId::new(id)?;
        Ok(derived)
    }

    /// Restricts the scenario to the given distro families.
    #[must_use]
    pub fn distros(mut self, distros: impl IntoIterator<Item = Distro>) -> Self {
        self.distros = distros.into_iter().collect();
        self
    }

    /// Replaces the installer config reference.
    #[must_use]
    pub fn conf_file(mut self, conf_file: impl Into<PathBuf>) -> Self {
        self.conf_file = conf_file.into();
        self
    }

    /// Sets a human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends kernel arguments.
    #[must_use]
    pub fn kernel_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kernel_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overlays topology overrides on top of any inherited ones.
    #[must_use]
    pub fn disks(mut self, disks: DiskOverrides) -> Self {
        self.disks = self.disks.overlay(&disks);
        self
    }

    /// Appends a collection block parsed from indented text.
    #[must_use]
    pub fn collect_text(self, text: &str) -> Self {
        self.collect_block(CommandBlock::from_text(text))
    }

    /// Appends a collection block.
    #[must_use]
    pub fn collect_block(mut self, block: CommandBlock) -> Self {
        self.collect = self.collect.extended(block);
        self
    }

    /// Appends an assertion.
    #[must_use]
    pub fn assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Returns true if the scenario can run against `distro`.
    #[must_use]
    pub fn supports(&self, distro: Distro) -> bool {
        self.distros.contains(&distro)
    }
}
