//! Release traits: one target OS image/variant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::ReleaseId;
use crate::topology::DiskOverrides;

/// Distribution family of a target release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distro {
    Ubuntu,
    Centos,
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ubuntu => write!(f, "ubuntu"),
            Self::Centos => write!(f, "centos"),
        }
    }
}

/// Which images the backend boots and installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Release of the ephemeral image that runs the installer.
    pub boot_release: String,
    /// Release installed onto the target disk.
    pub target_release: String,
    /// Alternate kernel package series (HWE kernels), if any.
    pub kernel_release: Option<String>,
    /// Machine architecture.
    pub arch: String,
}

/// Reusable description of one supported target release.
///
/// Defined once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTrait {
    pub id: ReleaseId,
    pub distro: Distro,
    pub image: ImageRef,
    /// Kernel arguments every install of this release boots with.
    pub kernel_args: Vec<String>,
    /// Disk defaults; scenarios override these field by field.
    pub disks: DiskOverrides,
    pub description: String,
}

impl ReleaseTrait {
    /// Ubuntu release that installs itself (`boot_release == target_release`).
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a valid identifier.
    pub fn ubuntu(id: &str, release: &str) -> Result<Self> {
        Self::new(id, Distro::Ubuntu, release, release)
    }

    /// CentOS target installed from an Ubuntu boot image.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a valid identifier.
    pub fn centos(id: &str, target_release: &str, boot_release: &str) -> Result<Self> {
        Self::new(id, Distro::Centos, boot_release, target_release)
    }

    fn new(id: &str, distro: Distro, boot_release: &str, target_release: &str) -> Result<Self> {
        Ok(Self {
            id: ReleaseId::new(id)?,
            distro,
            image: ImageRef {
                boot_release: boot_release.to_string(),
                target_release: target_release.to_string(),
                kernel_release: None,
                arch: "amd64".to_string(),
            },
            kernel_args: Vec::new(),
            disks: DiskOverrides::default(),
            description: String::new(),
        })
    }

    /// Selects an alternate kernel series.
    #[must_use]
    pub fn kernel_release(mut self, krel: impl Into<String>) -> Self {
        self.image.kernel_release = Some(krel.into());
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.image.arch = arch.into();
        self
    }

    /// Appends default kernel arguments.
    #[must_use]
    pub fn kernel_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kernel_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the disk defaults.
    #[must_use]
    pub fn disks(mut self, disks: DiskOverrides) -> Self {
        self.disks = disks;
        self
    }

    /// Sets a human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centos_from_ubuntu_image() {
        let rel = ReleaseTrait::centos("centos70-xenial", "centos70", "xenial").unwrap();
        assert_eq!(rel.distro, Distro::Centos);
        assert_eq!(rel.image.boot_release, "xenial");
        assert_eq!(rel.image.target_release, "centos70");
    }

    #[test]
    fn test_builder_appends_kernel_args() {
        let rel = ReleaseTrait::ubuntu("trusty-hwe-u", "trusty")
            .unwrap()
            .kernel_release("utopic")
            .kernel_args(["console=ttyS0"])
            .kernel_args(["quiet"]);
        assert_eq!(rel.kernel_args, vec!["console=ttyS0", "quiet"]);
        assert_eq!(rel.image.kernel_release.as_deref(), Some("utopic"));
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(ReleaseTrait::ubuntu("Xenial", "xenial").is_err());
    }
}
