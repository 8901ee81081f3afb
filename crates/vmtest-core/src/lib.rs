//! # vmtest-core
//!
//! Test-suite model for installer VM integration tests.
//!
//! This crate has no I/O beyond the artifact directory. It provides:
//!
//! - [`ReleaseTrait`] / [`ScenarioTrait`]: reusable descriptions of an OS
//!   release and of an installer scenario
//! - [`Matrix`]: the release × scenario product, filtered by a [`CompatTable`]
//! - [`ProvisioningSpec`]: the merged boot/install description for one unit
//! - [`CollectScript`]: the in-guest command sequence that gathers artifacts
//! - [`Assertion`]: declarative checks evaluated against an [`ArtifactStore`]
//!
//! ## Flow
//!
//! ```text
//!   ReleaseTrait ─┐
//!                 ├─► Matrix::compose ─► TestUnit { ProvisioningSpec }
//!  ScenarioTrait ─┘         ▲                        │
//!                      CompatTable              (vmtest-runner)
//!                                                    ▼
//!                       verify(unit, assertions, ArtifactStore)
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod artifacts;
pub mod builtin;
pub mod collect;
pub mod compat;
pub mod error;
pub mod fstab;
pub mod id;
pub mod matrix;
pub mod provision;
pub mod registry;
pub mod release;
pub mod scenario;
pub mod topology;
pub mod verify;

pub use artifacts::ArtifactStore;
pub use collect::{CollectScript, CommandBlock, OUTPUT_DIR_TOKEN};
pub use compat::{CompatEntry, CompatTable, Rule};
pub use error::{ArtifactError, ConfigError, Result};
pub use id::{ReleaseId, ScenarioId, UnitId};
pub use matrix::{Enablement, Matrix, TestUnit};
pub use provision::ProvisioningSpec;
pub use registry::{Catalog, CatalogBuilder};
pub use release::{Distro, ImageRef, ReleaseTrait};
pub use scenario::ScenarioTrait;
pub use topology::{DiskLayout, DiskOverrides};
pub use verify::{Assertion, AssertionFailure, Check, Verdict, VerificationReport, verify};
