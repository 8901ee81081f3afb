//! Per-unit artifact store.
//!
//! A flat directory of files named exactly as the collection script chose.
//! Raw copies of source directories may appear as nested trees; they are
//! addressed by their top-level name.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ArtifactError;

type Result<T> = std::result::Result<T, ArtifactError>;

/// Directory holding one unit execution's collected files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates an empty store at `root`, discarding anything a previous
    /// execution left there.
    ///
    /// # Errors
    ///
    /// Returns an error if the old directory cannot be removed or the new one
    /// cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        match std::fs::remove_dir_all(&root) {
            Ok(()) => debug!(path = %root.display(), "removed previous artifact store"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(ArtifactError::Store { path: root, source }),
        }
        std::fs::create_dir_all(&root).map_err(|source| ArtifactError::Store {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Opens an existing store without modifying it.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = std::fs::metadata(&root).map_err(|source| ArtifactError::Store {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ArtifactError::Store {
                path: root,
                source: std::io::Error::new(ErrorKind::NotADirectory, "not a directory"),
            });
        }
        Ok(Self { root })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path an artifact named `name` lives at.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::InvalidName`] for names that are empty or
    /// would escape the store.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Returns true if an artifact (file or directory tree) named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid names.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path(name)?.exists())
    }

    /// Reads an artifact. Absence is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names and for I/O failures other than
    /// absence.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ArtifactError::Read { path, source }),
        }
    }

    /// Reads an artifact as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// See [`ArtifactStore::read`].
    pub fn read_to_string(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .read(name)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Writes an artifact, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names or if the write fails.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(name)?;
        std::fs::write(&path, contents).map_err(|source| ArtifactError::Store {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Lists the top-level artifact names.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn names(&self) -> Result<BTreeSet<String>> {
        let store_err = |source| ArtifactError::Store {
            path: self.root.clone(),
            source,
        };
        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(&self.root).map_err(store_err)? {
            let entry = entry.map_err(store_err)?;
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        Err(ArtifactError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
