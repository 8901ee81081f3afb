//! Runner behaviour against an in-process fake backend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vmtest_core::{
    Assertion, CatalogBuilder, CompatTable, Matrix, ReleaseTrait, ScenarioTrait, TestUnit,
};
use vmtest_runner::pipeline::{self, PipelineSettings};
use vmtest_runner::{
    BackendError, KeepPolicy, Phase, ProvisionRequest, REPORT_FILE, RunSettings, Runner,
    ScriptOutcome, UnitStatus, VmBackend, VmInstance,
};

const GOOD_FSTAB: &str = "LABEL=cloudimg-rootfs / ext4 defaults 0 0\n";
const GUEST_DIR: &str = "/guest/out";

#[derive(Clone)]
enum Behavior {
    Files(Vec<(&'static str, &'static str)>),
    FailProvision,
    HangProvision,
    HangCollect,
    HangRelease,
}

#[derive(Default)]
struct Counters {
    provisioned: AtomicUsize,
    released: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    scripts: Mutex<Vec<String>>,
}

struct FakeBackend {
    behaviors: HashMap<&'static str, Behavior>,
    delay: Duration,
    counters: Arc<Counters>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            delay: Duration::ZERO,
            counters: Arc::new(Counters::default()),
        }
    }

    fn on(mut self, release: &'static str, behavior: Behavior) -> Self {
        self.behaviors.insert(release, behavior);
        self
    }

    fn behavior(&self, request: &ProvisionRequest) -> Behavior {
        self.behaviors
            .get(request.unit.release.as_str())
            .cloned()
            .unwrap_or_else(|| Behavior::Files(vec![("fstab", GOOD_FSTAB)]))
    }
}

#[async_trait]
impl VmBackend for FakeBackend {
    async fn provision(&self, request: &ProvisionRequest) -> Result<Box<dyn VmInstance>, BackendError> {
        let behavior = self.behavior(request);
        match behavior {
            Behavior::FailProvision => return Err(BackendError::backend("no image")),
            Behavior::HangProvision => return std::future::pending().await,
            _ => {}
        }

        let c = &self.counters;
        c.provisioned.fetch_add(1, Ordering::SeqCst);
        let active = c.active.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        Ok(Box::new(FakeInstance {
            name: request.name.clone(),
            behavior,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeInstance {
    name: String,
    behavior: Behavior,
    counters: Arc<Counters>,
}

#[async_trait]
impl VmInstance for FakeInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn guest_output_dir(&self) -> &str {
        GUEST_DIR
    }

    async fn run_script(&mut self, script: &str) -> Result<ScriptOutcome, BackendError> {
        self.counters.scripts.lock().unwrap().push(script.to_string());
        if matches!(self.behavior, Behavior::HangCollect) {
            return std::future::pending().await;
        }
        Ok(ScriptOutcome {
            exit_code: 1,
            stdout: "cp: cannot stat '/etc/multipath.conf'".to_string(),
            stderr: String::new(),
        })
    }

    async fn fetch_outputs(&mut self, guest_dir: &str, dest: &Path) -> Result<(), BackendError> {
        assert_eq!(guest_dir, GUEST_DIR);
        match &self.behavior {
            Behavior::Files(files) => {
                for (name, content) in files {
                    std::fs::write(dest.join(name), content)?;
                }
            }
            Behavior::HangRelease => std::fs::write(dest.join("fstab"), GOOD_FSTAB)?,
            _ => {}
        }
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<(), BackendError> {
        if matches!(self.behavior, Behavior::HangRelease) {
            return std::future::pending().await;
        }
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn matrix(releases: &[&str], compat: CompatTable) -> Matrix {
    let mut builder = CatalogBuilder::new();
    for id in releases {
        builder.release(ReleaseTrait::ubuntu(id, "xenial").unwrap()).unwrap();
    }
    builder
        .scenario(
            ScenarioTrait::new("basic", "examples/tests/basic.yaml")
                .unwrap()
                .collect_text(
                    "
                    cd OUTPUT_COLLECT_D
                    cat /etc/fstab > fstab
                    ",
                )
                .assertion(Assertion::fstab_mapping(
                    "fstab_entries",
                    "fstab",
                    [("LABEL=cloudimg-rootfs", "/")],
                )),
        )
        .unwrap();
    Matrix::compose(&builder.build(), &compat, None).unwrap()
}

fn settings(dir: &Path, concurrency: usize, keep: KeepPolicy) -> RunSettings {
    RunSettings {
        output_dir: dir.to_path_buf(),
        concurrency,
        keep,
        pipeline: PipelineSettings {
            provision_timeout: Duration::from_secs(10),
            collect_timeout: Duration::from_secs(10),
            release_timeout: Duration::from_secs(10),
            config_root: None,
        },
    }
}

fn units(matrix: &Matrix) -> Vec<&TestUnit> {
    matrix.units().collect()
}

fn unit_id(s: &str) -> vmtest_core::UnitId {
    vmtest_core::UnitId::parse(s).unwrap()
}

#[tokio::test]
async fn passing_unit_renders_script_and_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let counters = Arc::clone(&backend.counters);
    let m = matrix(&["xenial"], CompatTable::new());

    let runner = Runner::new(backend, settings(dir.path(), 1, KeepPolicy::OnFailure));
    let report = runner.run(&units(&m)).await.unwrap();

    assert!(report.success());
    let outcome = report.outcome(&unit_id("xenial/basic")).unwrap();
    assert_eq!(outcome.status, UnitStatus::Passed);
    assert_eq!(outcome.checked, 1);
    assert_eq!(outcome.script_exit_code, Some(1));
    assert!(outcome.instance.as_deref().unwrap().starts_with("vmtest-"));
    // passed units are not kept under on_failure
    assert!(outcome.artifacts.is_none());
    assert!(!report.run_dir.join("xenial__basic").exists());
    assert!(report.run_dir.join(REPORT_FILE).is_file());

    let scripts = counters.scripts.lock().unwrap();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("cd /guest/out\n"));
    assert!(!scripts[0].contains("OUTPUT_COLLECT_D"));
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_assertion_keeps_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        FakeBackend::new().on("bionic", Behavior::Files(vec![("fstab", "/dev/vda1 / ext4 defaults 0 0\n")])),
    );
    let m = matrix(&["bionic"], CompatTable::new());

    let runner = Runner::new(backend, settings(dir.path(), 1, KeepPolicy::OnFailure));
    let report = runner.run(&units(&m)).await.unwrap();

    assert!(!report.success());
    let outcome = report.outcome(&unit_id("bionic/basic")).unwrap();
    assert_eq!(outcome.status, UnitStatus::Failed);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].assertion, "fstab_entries");

    let unit_dir = outcome.artifacts.as_ref().unwrap();
    assert!(unit_dir.join("collect").join("fstab").is_file());
    assert!(unit_dir.join("collect.sh").is_file());
    assert!(
        std::fs::read_to_string(unit_dir.join("collect.log"))
            .unwrap()
            .starts_with("exit code: 1")
    );
}

#[tokio::test]
async fn provisioning_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new().on("trusty", Behavior::FailProvision));
    let counters = Arc::clone(&backend.counters);
    let m = matrix(&["trusty", "xenial"], CompatTable::new());

    let runner = Runner::new(backend, settings(dir.path(), 2, KeepPolicy::OnFailure));
    let report = runner.run(&units(&m)).await.unwrap();

    let trusty = report.outcome(&unit_id("trusty/basic")).unwrap();
    assert_eq!(trusty.status, UnitStatus::Errored);
    let error = trusty.error.as_ref().unwrap();
    assert_eq!(error.phase, Phase::Provision);
    assert!(!error.timeout);
    assert!(error.message.contains("no image"));

    assert_eq!(
        report.outcome(&unit_id("xenial/basic")).unwrap().status,
        UnitStatus::Passed
    );
    assert_eq!(report.summary.errored, 1);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(
        counters.provisioned.load(Ordering::SeqCst),
        counters.released.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn phase_timeouts_are_attributed_and_instances_released() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(
        FakeBackend::new()
            .on("trusty", Behavior::HangProvision)
            .on("xenial", Behavior::HangCollect),
    );
    let counters = Arc::clone(&backend.counters);
    let m = matrix(&["trusty", "xenial"], CompatTable::new());

    let settings = settings(dir.path(), 2, KeepPolicy::Always)
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
    let report = Runner::new(backend, settings).run(&units(&m)).await.unwrap();

    let trusty = report.outcome(&unit_id("trusty/basic")).unwrap();
    let error = trusty.error.as_ref().unwrap();
    assert_eq!(error.phase, Phase::Provision);
    assert!(error.timeout);
    assert!(error.message.ends_with("after 200ms"), "{}", error.message);

    let xenial = report.outcome(&unit_id("xenial/basic")).unwrap();
    let error = xenial.error.as_ref().unwrap();
    assert_eq!(error.phase, Phase::Collect);
    assert!(error.timeout);

    assert_eq!(counters.provisioned.load(Ordering::SeqCst), 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    assert_eq!(counters.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = FakeBackend::new();
    backend.delay = Duration::from_millis(50);
    let backend = Arc::new(backend);
    let counters = Arc::clone(&backend.counters);
    let m = matrix(&["r1", "r2", "r3", "r4", "r5", "r6"], CompatTable::new());

    let runner = Runner::new(backend, settings(dir.path(), 2, KeepPolicy::Never));
    let report = runner.run(&units(&m)).await.unwrap();

    assert_eq!(report.summary.passed, 6);
    let peak = counters.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency {peak}");
    assert_eq!(counters.released.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn disabled_units_are_skipped_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let counters = Arc::clone(&backend.counters);
    let compat = CompatTable::new()
        .disable("trusty", "basic", Some("covered by xenial"))
        .unwrap();
    let m = matrix(&["trusty", "xenial"], compat);

    let runner = Runner::new(backend, settings(dir.path(), 1, KeepPolicy::OnFailure));
    let report = runner.run(&units(&m)).await.unwrap();

    let trusty = report.outcome(&unit_id("trusty/basic")).unwrap();
    assert_eq!(trusty.status, UnitStatus::Skipped);
    assert_eq!(trusty.reason.as_deref(), Some("covered by xenial"));
    assert!(report.success());
    assert_eq!(counters.provisioned.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn keep_always_retains_passed_units() {
    let dir = tempfile::tempdir().unwrap();
    let m = matrix(&["xenial"], CompatTable::new());

    let runner = Runner::new(
        Arc::new(FakeBackend::new()),
        settings(dir.path(), 1, KeepPolicy::Always),
    );
    let report = runner.run(&units(&m)).await.unwrap();

    let kept = report.run_dir.join("xenial__basic");
    assert!(kept.join("collect").join("fstab").is_file());
    assert_eq!(
        report.outcome(&unit_id("xenial/basic")).unwrap().artifacts.as_deref(),
        Some(kept.as_path())
    );
}

#[tokio::test]
async fn hung_release_does_not_stall_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new().on("xenial", Behavior::HangRelease));
    let m = matrix(&["xenial", "bionic"], CompatTable::new());

    let settings = settings(dir.path(), 1, KeepPolicy::OnFailure)
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200))
        .with_release_timeout(Duration::from_millis(200));
    let runner = Runner::new(backend, settings);
    let report = tokio::time::timeout(Duration::from_secs(3), runner.run(&units(&m)))
        .await
        .expect("run should finish despite a hung release")
        .unwrap();

    // teardown trouble does not change the verdict
    assert_eq!(report.summary.passed, 2);
}

#[tokio::test]
async fn store_setup_failure_is_attributed_to_provisioning() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();

    let backend = FakeBackend::new();
    let counters = Arc::clone(&backend.counters);
    let m = matrix(&["xenial"], CompatTable::new());
    let unit = m.units().next().unwrap();

    let settings = settings(dir.path(), 1, KeepPolicy::Never);
    let outcome = pipeline::execute(&backend, unit, &settings.pipeline, &blocker).await;

    assert_eq!(outcome.status, UnitStatus::Errored);
    let error = outcome.error.as_ref().unwrap();
    assert_eq!(error.phase, Phase::Provision);
    assert!(!error.timeout);
    assert_eq!(counters.provisioned.load(Ordering::SeqCst), 0);
}
