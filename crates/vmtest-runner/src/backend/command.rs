//! Backend driving an external launcher program.
//!
//! The launcher implements four subcommands, each preceded by the configured
//! launcher arguments:
//!
//! ```text
//! <launcher> [args..] create   --name NAME --spec SPEC.json --config CONF.yaml
//! <launcher> [args..] exec     --name NAME            (script on stdin)
//! <launcher> [args..] copy-out --name NAME --src GUEST_DIR --dest HOST_DIR
//! <launcher> [args..] destroy  --name NAME
//! ```
//!
//! `exec` exits with the script's own exit status. Any other non-zero exit is
//! a backend failure.
//!
//! A `create` that is dropped before it returns, e.g. by a provisioning
//! timeout, is followed by a best-effort `destroy` for the same name.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ProvisionRequest, ScriptOutcome, VmBackend, VmInstance};
use crate::config::BackendConfig;
use crate::error::BackendError;

#[derive(Debug, Clone)]
struct Launcher {
    program: PathBuf,
    args: Vec<String>,
}

impl Launcher {
    fn command(&self, subcommand: &str, name: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(subcommand)
            .arg("--name")
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, subcommand: &str, name: &str, extra: &[&OsStr]) -> Result<Output, BackendError> {
        let mut cmd = self.command(subcommand, name);
        cmd.args(extra);
        debug!(launcher = %self.program.display(), subcommand, name, "running launcher");

        let output = cmd.output().await.map_err(|source| self.spawn_error(source))?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(BackendError::CommandFailed {
                command: subcommand.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> BackendError {
        BackendError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }

    /// Fires `destroy` without waiting for it. Used from `Drop`.
    fn spawn_destroy(&self, name: &str) {
        let _ = std::process::Command::new(&self.program)
            .args(&self.args)
            .arg("destroy")
            .arg("--name")
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
    }
}

/// Destroys a half-created instance if `create` is abandoned mid-flight.
struct CreateGuard<'a> {
    launcher: &'a Launcher,
    name: &'a str,
    armed: bool,
}

impl<'a> CreateGuard<'a> {
    fn arm(launcher: &'a Launcher, name: &'a str) -> Self {
        Self {
            launcher,
            name,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CreateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(name = %self.name, "create abandoned, destroying");
            self.launcher.spawn_destroy(self.name);
        }
    }
}

/// [`VmBackend`] that shells out to a launcher program.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    launcher: Launcher,
    guest_output_dir: String,
}

impl CommandBackend {
    /// Creates a backend for `launcher`.
    pub fn new(launcher: impl Into<PathBuf>, guest_output_dir: impl Into<String>) -> Self {
        Self {
            launcher: Launcher {
                program: launcher.into(),
                args: Vec::new(),
            },
            guest_output_dir: guest_output_dir.into(),
        }
    }

    /// Creates a backend from the `[backend]` configuration section.
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(&config.launcher, config.guest_output_dir.clone()).with_args(config.args.clone())
    }

    /// Sets arguments passed before every subcommand.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.launcher.args = args;
        self
    }
}

#[async_trait]
impl VmBackend for CommandBackend {
    async fn provision(&self, request: &ProvisionRequest) -> Result<Box<dyn VmInstance>, BackendError> {
        let spec_path = request.work_dir.join("spec.json");
        let spec = serde_json::to_vec_pretty(&request.spec)
            .map_err(|e| BackendError::backend(format!("cannot encode provisioning spec: {e}")))?;
        tokio::fs::write(&spec_path, spec).await?;

        let guard = CreateGuard::arm(&self.launcher, &request.name);
        let created = self
            .launcher
            .run(
                "create",
                &request.name,
                &[
                    OsStr::new("--spec"),
                    spec_path.as_os_str(),
                    OsStr::new("--config"),
                    request.config_file.as_os_str(),
                ],
            )
            .await;
        guard.disarm();
        created?;

        Ok(Box::new(CommandInstance {
            launcher: self.launcher.clone(),
            name: request.name.clone(),
            guest_output_dir: self.guest_output_dir.clone(),
            released: false,
        }))
    }
}

struct CommandInstance {
    launcher: Launcher,
    name: String,
    guest_output_dir: String,
    released: bool,
}

#[async_trait]
impl VmInstance for CommandInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn guest_output_dir(&self) -> &str {
        &self.guest_output_dir
    }

    async fn run_script(&mut self, script: &str) -> Result<ScriptOutcome, BackendError> {
        let mut child = self
            .launcher
            .command("exec", &self.name)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| self.launcher.spawn_error(source))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let exit_code = output
            .status
            .code()
            .ok_or_else(|| BackendError::backend(format!("exec terminated abnormally: {}", output.status)))?;

        Ok(ScriptOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn fetch_outputs(&mut self, guest_dir: &str, dest: &Path) -> Result<(), BackendError> {
        self.launcher
            .run(
                "copy-out",
                &self.name,
                &[
                    OsStr::new("--src"),
                    OsStr::new(guest_dir),
                    OsStr::new("--dest"),
                    dest.as_os_str(),
                ],
            )
            .await
            .map(drop)
    }

    async fn release(self: Box<Self>) -> Result<(), BackendError> {
        let mut this = self;
        // Left unset while destroy is in flight, so an abandoned release
        // still destroys from Drop.
        let destroyed = this.launcher.run("destroy", &this.name, &[]).await;
        this.released = true;
        destroyed.map(drop)
    }
}

impl Drop for CommandInstance {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(name = %self.name, "instance dropped without release, destroying");
        self.launcher.spawn_destroy(&self.name);
    }
}
