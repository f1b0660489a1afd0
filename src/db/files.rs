// src/db/files.rs

//! Owned-file manifest
//!
//! The ordered list of root-relative paths a package created. Parents are
//! always listed before their children, which lets cleanup walk the list
//! backwards.

use crate::error::{Error, Result};
use crate::filesystem::write_atomic;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedFileManifest {
    entries: Vec<PathBuf>,
}

impl OwnedFileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path; a leading `/` is dropped so entries stay root-relative
    pub fn push(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let path = path.strip_prefix("/").unwrap_or(path);
        self.entries.push(path.to_path_buf());
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        let path = path.strip_prefix("/").unwrap_or(path);
        self.entries.iter().any(|e| e == path)
    }

    /// Entries of `self` that `newer` no longer owns, in manifest order
    pub fn stale_against(&self, newer: &OwnedFileManifest) -> OwnedFileManifest {
        let keep: HashSet<&Path> = newer.iter().collect();
        OwnedFileManifest {
            entries: self
                .entries
                .iter()
                .filter(|e| !keep.contains(e.as_path()))
                .cloned()
                .collect(),
        }
    }

    /// Drop every entry contained in `others`
    pub fn without(&self, others: &HashSet<PathBuf>) -> OwnedFileManifest {
        OwnedFileManifest {
            entries: self
                .entries
                .iter()
                .filter(|e| !others.contains(*e))
                .cloned()
                .collect(),
        }
    }

    /// Parse the one-path-per-line form
    pub fn parse(content: &str) -> Self {
        let mut manifest = Self::new();
        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            manifest.push(line);
        }
        manifest
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}\n", e.display()))
            .collect()
    }

    /// Read a manifest file; a missing file is an empty manifest
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())
    }
}

impl FromIterator<PathBuf> for OwnedFileManifest {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        let mut manifest = Self::new();
        for path in iter {
            manifest.push(path);
        }
        manifest
    }
}
