// src/layout.rs

//! Filesystem layout of an evox root
//!
//! Every component receives a `Layout` instead of consulting a process-wide
//! root path. All state lives under `<root>/var/evox`.

use std::path::{Path, PathBuf};

/// Name of the installed-package database file
pub const DB_FILE: &str = "DB";
/// Manifest fields inside a package record directory
pub const PKGINFO_FILE: &str = "PKGINFO";
/// Dependency list inside a package record directory
pub const PKGDEPS_FILE: &str = "PKGDEPS";
/// Owned-file manifest inside a package record directory
pub const PKGTREE_FILE: &str = "PKGTREE";
/// Cached repository index file
pub const INDEX_FILE: &str = "INDEX";
/// Suffix of a record directory moved aside during an upgrade
pub const OLD_SUFFIX: &str = ".old";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    live: bool,
}

impl Layout {
    /// A layout for `root`; it is live exactly when `root` is `/`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let live = root == Path::new("/");
        Self { root, live }
    }

    /// Override whether this root is treated as the running system
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when operating on the running system rather than an offline image
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("var/evox")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.state_dir().join("packages")
    }

    pub fn db_path(&self) -> PathBuf {
        self.packages_dir().join(DB_FILE)
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }

    pub fn old_package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(format!("{name}{OLD_SUFFIX}"))
    }

    pub fn package_scripts_dir(&self, name: &str) -> PathBuf {
        self.package_dir(name).join("scripts")
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.state_dir().join("repos")
    }

    pub fn repo_dir(&self, repo: &str) -> PathBuf {
        self.repos_dir().join(repo)
    }

    pub fn repo_index_path(&self, repo: &str) -> PathBuf {
        self.repo_dir(repo).join(INDEX_FILE)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("lock")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("etc/evox.conf")
    }

    /// Resolve a root-relative manifest entry to an absolute path under the root
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        let stripped = relative.strip_prefix("/").unwrap_or(relative);
        self.root.join(stripped)
    }
}
