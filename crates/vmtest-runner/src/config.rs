//! Harness configuration.
//!
//! Configuration is loaded from multiple sources, later ones winning:
//!
//! 1. Default values
//! 2. System config file (/etc/vmtest/config.toml)
//! 3. User config file (~/.config/vmtest/config.toml), or the file given
//!    with `--config`
//! 4. Environment variables (`VMTEST_*`, nested with `__`, e.g.
//!    `VMTEST_RUN__CONCURRENCY=4`)
//!
//! ## Example Configuration File
//!
//! ```toml
//! output_dir = "/srv/vmtest/output"
//!
//! [run]
//! concurrency = 4
//! provision_timeout_secs = 1800
//! collect_timeout_secs = 600
//! release_timeout_secs = 300
//! keep = "on_failure"
//!
//! [backend]
//! launcher = "/usr/local/bin/vmtest-launch"
//! guest_output_dir = "/tmp/vmtest-collect"
//! args = ["--arch", "amd64"]
//!
//! [matrix]
//! config_root = "/srv/curtin"
//!
//! [[matrix.overrides]]
//! release = "bionic"
//! scenario = "multipath-basic"
//! state = "enabled"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use vmtest_core::{CompatEntry, ConfigError};

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root under which every run gets its own directory.
    pub output_dir: PathBuf,
    pub run: RunConfig,
    pub backend: BackendConfig,
    pub matrix: MatrixConfig,
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            run: RunConfig::default(),
            backend: BackendConfig::default(),
            matrix: MatrixConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from the system and user files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value has the
    /// wrong type.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file(user_config_path()))
            .merge(Env::prefixed("VMTEST_").split("__"))
            .extract()
    }

    /// Loads configuration from a specific file instead of the user file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file_exact(path.as_ref()))
            .merge(Env::prefixed("VMTEST_").split("__"))
            .extract()
    }

    /// Rejects values the runner cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.concurrency == 0 {
            return Err(ConfigError::invalid("run.concurrency must be at least 1"));
        }
        if self.run.provision_timeout_secs == 0 {
            return Err(ConfigError::invalid("run.provision_timeout_secs must be positive"));
        }
        if self.run.collect_timeout_secs == 0 {
            return Err(ConfigError::invalid("run.collect_timeout_secs must be positive"));
        }
        if self.run.release_timeout_secs == 0 {
            return Err(ConfigError::invalid("run.release_timeout_secs must be positive"));
        }
        if !is_plain_guest_path(&self.backend.guest_output_dir) {
            return Err(ConfigError::invalid(format!(
                "backend.guest_output_dir must be an absolute path of [A-Za-z0-9._/-], got {:?}",
                self.backend.guest_output_dir
            )));
        }
        Ok(())
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value has no TOML representation.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// What happens to a unit's directory once the run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepPolicy {
    Always,
    /// Keep directories of units that did not pass.
    #[default]
    OnFailure,
    Never,
}

/// Execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum number of units in flight.
    pub concurrency: usize,
    pub provision_timeout_secs: u64,
    pub collect_timeout_secs: u64,
    /// Bound on tearing an instance down.
    pub release_timeout_secs: u64,
    pub keep: KeepPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            provision_timeout_secs: 1800,
            collect_timeout_secs: 600,
            release_timeout_secs: 300,
            keep: KeepPolicy::default(),
        }
    }
}

impl RunConfig {
    #[must_use]
    pub const fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    #[must_use]
    pub const fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    #[must_use]
    pub const fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }
}

/// Launcher settings for the command backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Program implementing the `create`/`exec`/`copy-out`/`destroy` commands.
    pub launcher: PathBuf,
    /// Directory inside the guest that replaces `OUTPUT_COLLECT_D`.
    pub guest_output_dir: String,
    /// Arguments passed to the launcher before every subcommand.
    pub args: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            launcher: PathBuf::from("vmtest-launch"),
            guest_output_dir: "/tmp/vmtest-collect".to_string(),
            args: Vec::new(),
        }
    }
}

/// Matrix settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Directory that scenario config files are resolved against.
    pub config_root: Option<PathBuf>,
    /// Compatibility rules applied after the built-in table.
    pub overrides: Vec<CompatEntry>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// The guest dir is spliced unquoted into the collection script.
fn is_plain_guest_path(dir: &str) -> bool {
    dir.len() > 1
        && dir.starts_with('/')
        && dir
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'))
}

fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/var/tmp"))
        .join("vmtest")
        .join("runs")
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("vmtest")
        .join("config.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/vmtest/config.toml")
}
