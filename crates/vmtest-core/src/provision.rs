//! Provisioning specification builder.
//!
//! [`build`] merges a release and a scenario into the description the VM
//! backend boots from. It is pure: the same pair always yields a structurally
//! equal spec, which keeps VM boots reproducible.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::{ReleaseId, ScenarioId};
use crate::release::{ImageRef, ReleaseTrait};
use crate::scenario::ScenarioTrait;
use crate::topology::DiskLayout;

/// Merged boot/install description for one test unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSpec {
    pub release: ReleaseId,
    pub scenario: ScenarioId,
    /// Installer config; always the scenario's.
    pub conf_file: PathBuf,
    pub image: ImageRef,
    /// Release defaults followed by scenario extras. Never deduplicated.
    pub kernel_args: Vec<String>,
    pub disks: DiskLayout,
}

/// Merges `release` defaults with `scenario` overrides.
#[must_use]
pub fn build(release: &ReleaseTrait, scenario: &ScenarioTrait) -> ProvisioningSpec {
    let kernel_args = release
        .kernel_args
        .iter()
        .chain(&scenario.kernel_args)
        .cloned()
        .collect();

    ProvisioningSpec {
        release: release.id.clone(),
        scenario: scenario.id.clone(),
        conf_file: scenario.conf_file.clone(),
        image: release.image.clone(),
        kernel_args,
        disks: release.disks.overlay(&scenario.disks).resolve(),
    }
}
