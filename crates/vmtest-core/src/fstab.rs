//! Parsing of `/etc/fstab`-style tables.

use std::collections::BTreeMap;

use thiserror::Error;

/// Problems found while parsing a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FstabError {
    #[error("line {line}: expected at least two fields, got {content:?}")]
    Malformed { line: usize, content: String },

    #[error("line {line}: duplicate entry for {spec:?}")]
    Duplicate { line: usize, spec: String },
}

/// Parses `content` into a `volume spec -> mount point` mapping.
///
/// Blank lines and `#` comments are skipped. Only the first two
/// whitespace-separated columns are used.
///
/// # Errors
///
/// Returns an error for lines with fewer than two fields and for repeated
/// volume specs.
pub fn parse(content: &str) -> Result<BTreeMap<String, String>, FstabError> {
    let mut table = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(spec), Some(mount)) = (fields.next(), fields.next()) else {
            return Err(FstabError::Malformed {
                line: idx + 1,
                content: raw.to_string(),
            });
        };

        if table.insert(spec.to_string(), mount.to_string()).is_some() {
            return Err(FstabError::Duplicate {
                line: idx + 1,
                spec: spec.to_string(),
            });
        }
    }

    Ok(table)
}
