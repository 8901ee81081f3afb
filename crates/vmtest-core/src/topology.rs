//! Disk and controller topology.
//!
//! Traits carry [`DiskOverrides`], where every field is optional. Overlaying
//! is field-by-field with the later layer winning, which makes the merge
//! associative. Resolving an overlay yields a concrete [`DiskLayout`]; an
//! all-unset overlay resolves to the zero layout (one boot disk, backend
//! default driver).

use serde::{Deserialize, Serialize};

/// Partial disk topology contributed by one trait layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskOverrides {
    /// Disk driver model (e.g. `virtio-blk`, `scsi-hd`).
    pub driver: Option<String>,
    /// Additional disk sizes (e.g. `10G`) attached after the boot disk.
    pub extra_disks: Option<Vec<String>>,
    /// Attach the boot disk through two paths.
    pub multipath: Option<bool>,
    /// NVMe disk sizes.
    pub nvme_disks: Option<Vec<String>>,
}

impl DiskOverrides {
    /// Sets the driver.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Sets the extra disks.
    #[must_use]
    pub fn extra_disks<I, S>(mut self, disks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_disks = Some(disks.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the multipath flag.
    #[must_use]
    pub const fn multipath(mut self, enabled: bool) -> Self {
        self.multipath = Some(enabled);
        self
    }

    /// Sets the NVMe disks.
    #[must_use]
    pub fn nvme_disks<I, S>(mut self, disks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nvme_disks = Some(disks.into_iter().map(Into::into).collect());
        self
    }

    /// Returns `self` with every field set in `later` replaced by `later`'s value.
    #[must_use]
    pub fn overlay(&self, later: &Self) -> Self {
        Self {
            driver: later.driver.clone().or_else(|| self.driver.clone()),
            extra_disks: later.extra_disks.clone().or_else(|| self.extra_disks.clone()),
            multipath: later.multipath.or(self.multipath),
            nvme_disks: later.nvme_disks.clone().or_else(|| self.nvme_disks.clone()),
        }
    }

    /// Resolves unset fields to the zero layout.
    #[must_use]
    pub fn resolve(&self) -> DiskLayout {
        DiskLayout {
            driver: self.driver.clone(),
            extra_disks: self.extra_disks.clone().unwrap_or_default(),
            multipath: self.multipath.unwrap_or(false),
            nvme_disks: self.nvme_disks.clone().unwrap_or_default(),
        }
    }
}

/// Concrete disk topology handed to the VM backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskLayout {
    /// Disk driver; `None` lets the backend pick its default.
    pub driver: Option<String>,
    pub extra_disks: Vec<String>,
    pub multipath: bool,
    pub nvme_disks: Vec<String>,
}

impl DiskLayout {
    /// Returns true for a plain single-disk VM.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}
