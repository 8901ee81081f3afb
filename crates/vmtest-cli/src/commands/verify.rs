//! Verify command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use vmtest_core::{ArtifactStore, verify};
use vmtest_runner::HarnessConfig;
use vmtest_runner::pipeline::COLLECT_DIR;

use super::{OutputFormat, find_unit, load_matrix};

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Unit identity, release/scenario
    pub unit: String,

    /// Kept unit directory, or the artifact directory inside it
    pub dir: PathBuf,
}

/// Executes the verify command. Returns false if any assertion failed.
pub fn execute(args: VerifyArgs, config: &HarnessConfig, format: OutputFormat) -> Result<bool> {
    let matrix = load_matrix(config)?;
    let unit = find_unit(&matrix, &args.unit)?;

    let store = ArtifactStore::open(artifact_dir(&args.dir))
        .with_context(|| format!("cannot open artifacts in {}", args.dir.display()))?;
    let report = verify(unit.id(), &unit.scenario().assertions, &store)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            for failure in &report.failures {
                println!("{failure}");
            }
            println!(
                "{}: {} of {} assertions passed",
                unit.id(),
                report.checked - report.failures.len(),
                report.checked
            );
        }
    }
    Ok(report.passed())
}

fn artifact_dir(dir: &Path) -> PathBuf {
    let nested = dir.join(COLLECT_DIR);
    if nested.is_dir() { nested } else { dir.to_path_buf() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_dir_prefers_collect_subdir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(artifact_dir(dir.path()), dir.path());

        std::fs::create_dir(dir.path().join(COLLECT_DIR)).unwrap();
        assert_eq!(artifact_dir(dir.path()), dir.path().join(COLLECT_DIR));
    }

    #[test]
    fn test_verify_kept_unit_directory() {
        let dir = tempfile::tempdir().unwrap();
        let collect = dir.path().join(COLLECT_DIR);
        std::fs::create_dir(&collect).unwrap();
        std::fs::write(collect.join("fstab"), "LABEL=cloudimg-rootfs / ext4 defaults 0 0\n").unwrap();

        let args = VerifyArgs {
            unit: "centos70-xenial/centos-basic".into(),
            dir: dir.path().to_path_buf(),
        };
        assert!(execute(args, &HarnessConfig::default(), OutputFormat::Json).unwrap());

        std::fs::remove_file(collect.join("fstab")).unwrap();
        let args = VerifyArgs {
            unit: "centos70-xenial/centos-basic".into(),
            dir: dir.path().to_path_buf(),
        };
        assert!(!execute(args, &HarnessConfig::default(), OutputFormat::Json).unwrap());
    }
}
