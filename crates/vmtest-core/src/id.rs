//! Stable identifiers for traits and test units.
//!
//! Unit identity is derived only from trait identifiers, never from
//! registration or generation order, so selection and reporting are
//! reproducible across runs and hosts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps an identifier.
            ///
            /// # Errors
            ///
            /// Returns [`ConfigError::InvalidIdentifier`] if the value is empty or
            /// contains characters outside `[a-z0-9._-]`.
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                validate(&value)?;
                Ok(Self(value))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ConfigError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier!(
    /// Identifier of a [`ReleaseTrait`](crate::release::ReleaseTrait), e.g. `xenial`.
    ReleaseId
);

identifier!(
    /// Identifier of a [`ScenarioTrait`](crate::scenario::ScenarioTrait), e.g. `multipath-basic`.
    ScenarioId
);

fn validate(value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(value.to_string()))
    }
}

/// Identity of a test unit: `(release, scenario)`.
///
/// Ordering is lexicographic by release, then scenario.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId {
    pub release: ReleaseId,
    pub scenario: ScenarioId,
}

impl UnitId {
    /// Creates a unit identity.
    #[must_use]
    pub const fn new(release: ReleaseId, scenario: ScenarioId) -> Self {
        Self { release, scenario }
    }

    /// Parses the `release/scenario` display form.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing or either half is invalid.
    pub fn parse(value: &str) -> Result<Self> {
        let (release, scenario) = value
            .split_once('/')
            .ok_or_else(|| ConfigError::invalid(format!("unit id {value:?} is not release/scenario")))?;
        Ok(Self::new(ReleaseId::new(release)?, ScenarioId::new(scenario)?))
    }

    /// Directory name for this unit's working directory.
    ///
    /// Unique per unit, so concurrent executions never share a namespace.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}__{}", self.release, self.scenario)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.release, self.scenario)
    }
}
