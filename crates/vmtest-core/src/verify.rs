//! Verification layer.
//!
//! An [`Assertion`] is a named, stateless predicate over an
//! [`ArtifactStore`]. Evaluating it never mutates the store, so running it
//! twice against unchanged artifacts gives the same [`Verdict`].
//!
//! A missing artifact is an ordinary failing verdict with a diagnostic. Only
//! I/O problems other than absence (permissions, reading a directory as a
//! file) surface as [`ArtifactError`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::artifacts::ArtifactStore;
use crate::error::{ArtifactError, ConfigError};
use crate::fstab;
use crate::id::UnitId;

/// Compiled regular expression that remembers its source text.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles `source` in multi-line mode, so `^`/`$` match per line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the pattern does not compile.
    pub fn new(source: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("(?m){source}")).map_err(|source_err| {
            ConfigError::InvalidPattern {
                pattern: source.to_string(),
                source: source_err,
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn matching_lines<'a>(&self, content: &'a str) -> Vec<&'a str> {
        content
            .lines()
            .filter(|line| self.regex.is_match(line))
            .collect()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

/// The predicate an assertion evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    /// Every named artifact exists.
    FilesExist { files: Vec<String> },
    /// No named artifact exists.
    FilesAbsent { files: Vec<String> },
    /// Two artifacts are byte-identical.
    FilesEqual { left: String, right: String },
    /// An fstab-style table contains every expected `spec -> mount` pair.
    FstabMapping {
        file: String,
        expected: BTreeMap<String, String>,
    },
    /// Some line of the artifact matches the pattern.
    ContainsPattern { file: String, pattern: Pattern },
    /// No line of the artifact matches the pattern.
    LacksPattern { file: String, pattern: Pattern },
    /// Some line equals `line` once surrounding whitespace is stripped.
    LinePresent { file: String, line: String },
}

/// A named verification predicate owned by a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub name: String,
    pub check: Check,
}

/// Diagnostic for a predicate that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionFailure {
    pub unit: UnitId,
    pub assertion: String,
    /// Every artifact path the assertion inspected.
    pub files: Vec<PathBuf>,
    /// Artifacts that were expected but absent.
    pub missing: Vec<String>,
    pub expected: String,
    pub actual: String,
}

impl AssertionFailure {
    /// Returns true if the failure was caused by absent artifacts.
    #[must_use]
    pub fn is_missing_file(&self) -> bool {
        !self.missing.is_empty()
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: assertion '{}' failed", self.unit, self.assertion)?;
        for path in &self.files {
            writeln!(f, "  inspected: {}", path.display())?;
        }
        if !self.missing.is_empty() {
            writeln!(f, "  missing:   {}", self.missing.join(", "))?;
        }
        writeln!(f, "  expected:  {}", self.expected)?;
        write!(f, "  actual:    {}", self.actual)
    }
}

/// Outcome of evaluating one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Box<AssertionFailure>),
}

impl Verdict {
    /// Returns true for [`Verdict::Pass`].
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl Assertion {
    /// Every file in `files` must exist.
    pub fn files_exist<I, S>(name: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, Check::FilesExist {
            files: files.into_iter().map(Into::into).collect(),
        })
    }

    /// Every file in `files` must be absent.
    pub fn files_absent<I, S>(name: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, Check::FilesAbsent {
            files: files.into_iter().map(Into::into).collect(),
        })
    }

    /// `left` and `right` must be byte-identical.
    pub fn files_equal(
        name: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self::new(name, Check::FilesEqual {
            left: left.into(),
            right: right.into(),
        })
    }

    /// `file` must parse as an fstab table containing every `expected` entry.
    pub fn fstab_mapping<I, K, V>(name: impl Into<String>, file: impl Into<String>, expected: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(name, Check::FstabMapping {
            file: file.into(),
            expected: expected
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    /// Some line of `file` must match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn contains_pattern(
        name: impl Into<String>,
        file: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(name, Check::ContainsPattern {
            file: file.into(),
            pattern: Pattern::new(pattern)?,
        }))
    }

    /// No line of `file` may match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn lacks_pattern(
        name: impl Into<String>,
        file: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(name, Check::LacksPattern {
            file: file.into(),
            pattern: Pattern::new(pattern)?,
        }))
    }

    /// Some stripped line of `file` must equal `line`.
    pub fn line_present(
        name: impl Into<String>,
        file: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self::new(name, Check::LinePresent {
            file: file.into(),
            line: line.into(),
        })
    }

    fn new(name: impl Into<String>, check: Check) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    /// Evaluates the assertion for `unit` against `store`.
    ///
    /// # Errors
    ///
    /// Returns an error only when an artifact exists but cannot be read, or an
    /// artifact name is invalid.
    pub fn evaluate(&self, unit: &UnitId, store: &ArtifactStore) -> Result<Verdict, ArtifactError> {
        let eval = Evaluation {
            unit,
            name: &self.name,
            store,
        };

        match &self.check {
            Check::FilesExist { files } => eval.files_exist(files),
            Check::FilesAbsent { files } => eval.files_absent(files),
            Check::FilesEqual { left, right } => eval.files_equal(left, right),
            Check::FstabMapping { file, expected } => eval.fstab_mapping(file, expected),
            Check::ContainsPattern { file, pattern } => eval.pattern(file, pattern, true),
            Check::LacksPattern { file, pattern } => eval.pattern(file, pattern, false),
            Check::LinePresent { file, line } => eval.line_present(file, line),
        }
    }
}

struct Evaluation<'a> {
    unit: &'a UnitId,
    name: &'a str,
    store: &'a ArtifactStore,
}

impl Evaluation<'_> {
    fn fail(
        &self,
        files: &[&str],
        missing: Vec<String>,
        expected: String,
        actual: String,
    ) -> Result<Verdict, ArtifactError> {
        let files = files
            .iter()
            .map(|name| self.store.path(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Verdict::Fail(Box::new(AssertionFailure {
            unit: self.unit.clone(),
            assertion: self.name.to_string(),
            files,
            missing,
            expected,
            actual,
        })))
    }

    fn missing(&self, file: &str, expected: String) -> Result<Verdict, ArtifactError> {
        self.fail(
            &[file],
            vec![file.to_string()],
            expected,
            format!("{file} does not exist"),
        )
    }

    fn files_exist(&self, files: &[String]) -> Result<Verdict, ArtifactError> {
        let mut missing = Vec::new();
        for file in files {
            if !self.store.exists(file)? {
                missing.push(file.clone());
            }
        }
        if missing.is_empty() {
            return Ok(Verdict::Pass);
        }
        let names: Vec<&str> = files.iter().map(String::as_str).collect();
        let actual = format!("missing: {}", missing.join(", "));
        self.fail(&names, missing, format!("present: {}", files.join(", ")), actual)
    }

    fn files_absent(&self, files: &[String]) -> Result<Verdict, ArtifactError> {
        let mut present = Vec::new();
        for file in files {
            if self.store.exists(file)? {
                present.push(file.clone());
            }
        }
        if present.is_empty() {
            return Ok(Verdict::Pass);
        }
        let names: Vec<&str> = files.iter().map(String::as_str).collect();
        self.fail(
            &names,
            Vec::new(),
            format!("absent: {}", files.join(", ")),
            format!("present: {}", present.join(", ")),
        )
    }

    fn files_equal(&self, left: &str, right: &str) -> Result<Verdict, ArtifactError> {
        let left_data = self.store.read(left)?;
        let right_data = self.store.read(right)?;

        match (left_data, right_data) {
            (Some(a), Some(b)) if a == b => Ok(Verdict::Pass),
            (Some(a), Some(b)) => self.fail(
                &[left, right],
                Vec::new(),
                format!("{left}: {:?}", String::from_utf8_lossy(&a)),
                format!("{right}: {:?}", String::from_utf8_lossy(&b)),
            ),
            (a, b) => {
                let missing: Vec<String> = [(left, a.is_none()), (right, b.is_none())]
                    .into_iter()
                    .filter(|(_, absent)| *absent)
                    .map(|(name, _)| name.to_string())
                    .collect();
                let actual = format!("missing: {}", missing.join(", "));
                self.fail(
                    &[left, right],
                    missing,
                    format!("{left} and {right} present and identical"),
                    actual,
                )
            }
        }
    }

    fn fstab_mapping(
        &self,
        file: &str,
        expected: &BTreeMap<String, String>,
    ) -> Result<Verdict, ArtifactError> {
        let expected_desc = format_map(expected.iter());
        let Some(content) = self.store.read_to_string(file)? else {
            return self.missing(file, expected_desc);
        };

        let table = match fstab::parse(&content) {
            Ok(table) => table,
            Err(e) => return self.fail(&[file], Vec::new(), expected_desc, format!("unparseable: {e}")),
        };

        let holds = expected
            .iter()
            .all(|(spec, mount)| table.get(spec) == Some(mount));
        if holds {
            Ok(Verdict::Pass)
        } else {
            self.fail(&[file], Vec::new(), expected_desc, format_map(table.iter()))
        }
    }

    fn pattern(&self, file: &str, pattern: &Pattern, want_match: bool) -> Result<Verdict, ArtifactError> {
        let expected = if want_match {
            format!("a line matching /{}/", pattern.as_str())
        } else {
            format!("no line matching /{}/", pattern.as_str())
        };
        let Some(content) = self.store.read_to_string(file)? else {
            return self.missing(file, expected);
        };

        let matches = pattern.matching_lines(&content);
        match (want_match, matches.is_empty()) {
            (true, false) | (false, true) => Ok(Verdict::Pass),
            (true, true) => self.fail(&[file], Vec::new(), expected, format!("{content:?}")),
            (false, false) => self.fail(
                &[file],
                Vec::new(),
                expected,
                format!("matching lines: {matches:?}"),
            ),
        }
    }

    fn line_present(&self, file: &str, line: &str) -> Result<Verdict, ArtifactError> {
        let expected = format!("a line equal to {line:?}");
        let Some(content) = self.store.read_to_string(file)? else {
            return self.missing(file, expected);
        };
        if content.lines().any(|l| l.trim() == line) {
            Ok(Verdict::Pass)
        } else {
            self.fail(&[file], Vec::new(), expected, format!("{content:?}"))
        }
    }
}

fn format_map<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let body: Vec<String> = entries.map(|(k, v)| format!("{k} -> {v}")).collect();
    format!("{{{}}}", body.join(", "))
}

/// Result of running a scenario's assertion set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Number of assertions evaluated.
    pub checked: usize,
    pub failures: Vec<AssertionFailure>,
}

impl VerificationReport {
    /// Returns true if every assertion held.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluates every assertion in order.
///
/// # Errors
///
/// Stops at the first [`ArtifactError`].
pub fn verify(
    unit: &UnitId,
    assertions: &[Assertion],
    store: &ArtifactStore,
) -> Result<VerificationReport, ArtifactError> {
    let mut report = VerificationReport::default();
    for assertion in assertions {
        report.checked += 1;
        if let Verdict::Fail(failure) = assertion.evaluate(unit, store)? {
            tracing::debug!(unit = %unit, assertion = %assertion.name, "assertion failed");
            report.failures.push(*failure);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, ArtifactStore, UnitId) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(dir.path().join("collect")).unwrap();
        let unit = UnitId::parse("xenial/multipath-basic").unwrap();
        (dir, store, unit)
    }

    fn failure(verdict: Verdict) -> AssertionFailure {
        match verdict {
            Verdict::Fail(f) => *f,
            Verdict::Pass => panic!("expected failure"),
        }
    }

    #[test]
    fn test_files_exist_reports_missing() {
        let (_dir, store, unit) = setup();
        store.write("fstab", "x").unwrap();

        let a = Assertion::files_exist("output_files_exist", ["fstab", "ls_dname"]);
        let f = failure(a.evaluate(&unit, &store).unwrap());
        assert_eq!(f.missing, vec!["ls_dname"]);
        assert_eq!(f.files.len(), 2);
        assert!(f.is_missing_file());
    }

    #[test]
    fn test_files_absent() {
        let (_dir, store, unit) = setup();
        let a = Assertion::files_absent("no_interfaces_d", ["50-cloud-init.cfg"]);
        assert!(a.evaluate(&unit, &store).unwrap().is_pass());

        store.write("50-cloud-init.cfg", "auto eth0").unwrap();
        let f = failure(a.evaluate(&unit, &store).unwrap());
        assert_eq!(f.actual, "present: 50-cloud-init.cfg");
    }

    #[test]
    fn test_files_equal_one_missing() {
        let (_dir, store, unit) = setup();
        store.write("holders_sda", "dm-0\n").unwrap();
        let a = Assertion::files_equal("multipath_disks_match", "holders_sda", "holders_sdb");
        let f = failure(a.evaluate(&unit, &store).unwrap());
        assert_eq!(f.missing, vec!["holders_sdb"]);
    }

    #[test]
    fn test_fstab_mapping_mismatch_and_parse_error() {
        let (_dir, store, unit) = setup();
        let a = Assertion::fstab_mapping("fstab", "fstab", [("LABEL=cloudimg-rootfs", "/")]);

        store.write("fstab", "LABEL=cloudimg-rootfs /srv\n").unwrap();
        let f = failure(a.evaluate(&unit, &store).unwrap());
        assert_eq!(f.expected, "{LABEL=cloudimg-rootfs -> /}");
        assert_eq!(f.actual, "{LABEL=cloudimg-rootfs -> /srv}");

        store.write("fstab", "LABEL=x /\nLABEL=x /\n").unwrap();
        let f = failure(a.evaluate(&unit, &store).unwrap());
        assert!(f.actual.starts_with("unparseable"));
    }

    #[test]
    fn test_fstab_mapping_is_unordered_subset() {
        let (_dir, store, unit) = setup();
        store
            .write("fstab", "UUID=b /boot ext4 defaults 0 0\nLABEL=root / ext4 defaults 0 0\n")
            .unwrap();
        let a = Assertion::fstab_mapping("fstab", "fstab", [("LABEL=root", "/"), ("UUID=b", "/boot")]);
        assert!(a.evaluate(&unit, &store).unwrap().is_pass());
    }

    #[test]
    fn test_patterns() {
        let (_dir, store, unit) = setup();
        store
            .write("find_interfacesd", "/etc/network/interfaces.d\n/etc/network/interfaces.d/50-cloud-init.cfg\n")
            .unwrap();

        let lacks = Assertion::lacks_pattern("interfacesd_eth0_removed", "find_interfacesd", r"50-cloud-init\.cfg$").unwrap();
        let f = failure(lacks.evaluate(&unit, &store).unwrap());
        assert!(f.actual.contains("50-cloud-init.cfg"));

        let contains = Assertion::contains_pattern("has_dir", "find_interfacesd", r"^/etc/network/interfaces\.d$").unwrap();
        assert!(contains.evaluate(&unit, &store).unwrap().is_pass());

        let missing = Assertion::lacks_pattern("x", "nope", "a").unwrap();
        assert!(failure(missing.evaluate(&unit, &store).unwrap()).is_missing_file());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        assert!(matches!(
            Assertion::contains_pattern("bad", "f", "("),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_line_present_strips_whitespace() {
        let (_dir, store, unit) = setup();
        store.write("resolv.conf", "  nameserver 10.0.2.3  \n").unwrap();
        let a = Assertion::line_present("resolv", "resolv.conf", "nameserver 10.0.2.3");
        assert!(a.evaluate(&unit, &store).unwrap().is_pass());
    }

    #[test]
    fn test_verify_collects_all_failures() {
        let (_dir, store, unit) = setup();
        store.write("fstab", "LABEL=cloudimg-rootfs /\n").unwrap();
        let assertions = vec![
            Assertion::files_exist("exists", ["fstab"]),
            Assertion::files_exist("dname", ["ls_dname"]),
            Assertion::files_absent("absent", ["fstab"]),
        ];
        let report = verify(&unit, &assertions, &store).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.failures.len(), 2);
        assert!(!report.passed());
    }

    #[test]
    fn test_failure_display_names_unit_and_files() {
        let (_dir, store, unit) = setup();
        let a = Assertion::files_exist("output_files_exist", ["fstab"]);
        let text = failure(a.evaluate(&unit, &store).unwrap()).to_string();
        assert!(text.starts_with("xenial/multipath-basic: assertion 'output_files_exist' failed"));
        assert!(text.contains("missing:   fstab"));
    }
}
