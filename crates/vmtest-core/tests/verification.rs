//! Built-in scenario assertions evaluated against hand-made artifact trees.

use vmtest_core::{ArtifactStore, Matrix, UnitId, builtin, verify};

fn unit(id: &str) -> (UnitId, vmtest_core::ScenarioTrait) {
    let matrix = Matrix::compose(
        &builtin::catalog().unwrap(),
        &builtin::compat_table().unwrap(),
        None,
    )
    .unwrap();
    let id = UnitId::parse(id).unwrap();
    let scenario = matrix.get(&id).unwrap().scenario().clone();
    (id, scenario)
}

fn store(files: &[(&str, &str)]) -> (tempfile::TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::create(dir.path().join("collect")).unwrap();
    for (name, content) in files {
        store.write(name, content).unwrap();
    }
    (dir, store)
}

const FSTAB: &str = "\
# /etc/fstab
LABEL=cloudimg-rootfs / ext4 defaults 0 0
";

#[test]
fn centos_basic_passes_with_expected_fstab() {
    let (id, scenario) = unit("centos70-xenial/centos-basic");
    let (_dir, store) = store(&[("fstab", FSTAB)]);

    let report = verify(&id, &scenario.assertions, &store).unwrap();
    assert!(report.passed(), "{:?}", report.failures);
    assert_eq!(report.checked, scenario.assertions.len());
}

#[test]
fn centos_basic_reports_missing_fstab() {
    let (id, scenario) = unit("centos70-xenial/centos-basic");
    let (_dir, store) = store(&[("rpm_qa", "bash-4.2\n")]);

    let report = verify(&id, &scenario.assertions, &store).unwrap();
    assert!(!report.passed());
    assert!(report.failures.iter().all(|f| f.is_missing_file()));
    assert!(report.failures.iter().all(|f| f.missing == vec!["fstab".to_string()]));

    let rendered = report.failures[0].to_string();
    assert!(rendered.starts_with("centos70-xenial/centos-basic: assertion"));
    assert!(rendered.contains("fstab"));
}

fn multipath_files(sdb_holder: &str) -> Vec<(&'static str, String)> {
    vec![
        ("fstab", FSTAB.to_string()),
        ("ls_dname", "sda\nsda-part1\n".to_string()),
        ("holders_sda", "/sys/devices/virtual/block/dm-0\n".to_string()),
        ("holders_sdb", format!("{sdb_holder}\n")),
        (
            "find_interfacesd",
            "/etc/network/interfaces.d\n/etc/network/interfaces.d/50-cloud-init.cfg\n".to_string(),
        ),
    ]
}

#[test]
fn multipath_holders_match() {
    let (id, scenario) = unit("xenial/multipath-basic");
    let files = multipath_files("/sys/devices/virtual/block/dm-0");
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (*n, c.as_str())).collect();
    let (_dir, store) = store(&refs);

    let report = verify(&id, &scenario.assertions, &store).unwrap();
    assert!(report.passed(), "{:?}", report.failures);
}

#[test]
fn multipath_holders_differ_names_both_files() {
    let (id, scenario) = unit("xenial/multipath-basic");
    let files = multipath_files("/sys/devices/virtual/block/dm-1");
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (*n, c.as_str())).collect();
    let (_dir, store) = store(&refs);

    let report = verify(&id, &scenario.assertions, &store).unwrap();
    assert_eq!(report.failures.len(), 1);

    let failure = &report.failures[0];
    assert_eq!(failure.assertion, "multipath_disks_match");
    assert_eq!(
        failure.files,
        vec![store.path("holders_sda").unwrap(), store.path("holders_sdb").unwrap()]
    );
    assert!(failure.expected.contains("dm-0"));
    assert!(failure.actual.contains("dm-1"));
    assert!(!failure.is_missing_file());
}

#[test]
fn multipath_flags_leftover_eth0_config() {
    let (id, scenario) = unit("trusty/multipath-basic");
    let mut files = multipath_files("/sys/devices/virtual/block/dm-0");
    files.push((
        "find_interfacesd",
        "/etc/network/interfaces.d\n/etc/network/interfaces.d/eth0.cfg\n".to_string(),
    ));
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (*n, c.as_str())).collect();
    let (_dir, store) = store(&refs);

    let report = verify(&id, &scenario.assertions, &store).unwrap();
    let names: Vec<&str> = report.failures.iter().map(|f| f.assertion.as_str()).collect();
    assert_eq!(names, vec!["interfacesd_eth0_removed"]);
}

#[test]
fn verification_is_idempotent() {
    let (id, scenario) = unit("xenial/multipath-basic");
    let files = multipath_files("/sys/devices/virtual/block/dm-1");
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (*n, c.as_str())).collect();
    let (_dir, store) = store(&refs);

    let first = verify(&id, &scenario.assertions, &store).unwrap();
    let second = verify(&id, &scenario.assertions, &store).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.names().unwrap().len(), 5);
}

#[test]
fn static_routes_need_a_gateway_route() {
    let (id, scenario) = unit("xenial/network-static-routes");
    let mut files = vec![
        ("ip_a", "1: lo: <LOOPBACK>\n"),
        ("route_n", "Kernel IP routing table\n"),
        ("interfaces", "auto eth0\niface eth0 inet static\n"),
        ("resolv.conf", "nameserver 10.0.2.3\n"),
        ("ip_route_show", "10.0.2.0/24 dev eth0 proto kernel\n"),
    ];
    let (_dir, without) = store(&files);
    let report = verify(&id, &scenario.assertions, &without).unwrap();
    let names: Vec<&str> = report.failures.iter().map(|f| f.assertion.as_str()).collect();
    assert_eq!(names, vec!["static_routes_applied"]);

    files.pop();
    files.push((
        "ip_route_show",
        "10.0.2.0/24 dev eth0 proto kernel\n172.16.0.0/16 via 10.0.2.100 dev eth0\n",
    ));
    let (_dir2, with) = store(&files);
    assert!(verify(&id, &scenario.assertions, &with).unwrap().passed());
}
