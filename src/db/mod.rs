// src/db/mod.rs

//! Local state store for Evox
//!
//! The authoritative record of installed packages:
//! - `var/evox/packages/DB`: one `name version installDate` line per package
//! - `var/evox/packages/<name>/`: PKGINFO, PKGDEPS, PKGTREE and `scripts/`
//!
//! Registration appends to the database; every other mutation rewrites it
//! through a temporary file renamed over the original.

pub mod files;
pub mod lock;
pub mod models;

pub use files::OwnedFileManifest;
pub use lock::StateLock;
pub use models::InstalledRecord;

use crate::error::{Error, Result};
use crate::filesystem::{copy_flat_dir, write_atomic};
use crate::layout::{Layout, OLD_SUFFIX, PKGDEPS_FILE, PKGINFO_FILE, PKGTREE_FILE};
use crate::packages::manifest::{PackageManifest, parse_dependency_list, render_dependency_list};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle on the installed-package state of one root
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    layout: Layout,
}

impl LocalStateStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Create the packages directory and an empty database
    ///
    /// This is idempotent - calling it on an existing store is safe.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.layout.packages_dir())?;
        let db_path = self.layout.db_path();
        if !db_path.exists() {
            fs::write(&db_path, "")?;
            info!("Created package database at {}", db_path.display());
        }
        Ok(())
    }

    fn read_records(&self) -> Result<Vec<InstalledRecord>> {
        let content = match fs::read_to_string(self.layout.db_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut records = Vec::new();
        for line in content.lines() {
            if let Some(record) = InstalledRecord::parse_line(line)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn write_records(&self, records: &[InstalledRecord]) -> Result<()> {
        let content: String = records.iter().map(InstalledRecord::to_line).collect();
        write_atomic(&self.layout.db_path(), content.as_bytes())
    }

    /// Point-in-time snapshot of installed packages, in database order
    pub fn list_installed(&self) -> Result<Vec<InstalledRecord>> {
        self.read_records()
    }

    pub fn find(&self, name: &str) -> Result<Option<InstalledRecord>> {
        Ok(self.read_records()?.into_iter().find(|r| r.name == name))
    }

    pub fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.find(name)?.is_some())
    }

    /// Record a newly installed package
    ///
    /// The owned-file manifest and dependency list land in the record
    /// directory before the database line is appended.
    pub fn register(
        &self,
        record: &InstalledRecord,
        files: &OwnedFileManifest,
        deps: &[String],
    ) -> Result<()> {
        if self.is_installed(&record.name)? {
            return Err(Error::Duplicate(record.name.clone()));
        }

        self.write_package_state(&record.name, files, deps)?;

        let mut db = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.layout.db_path())?;
        db.write_all(record.to_line().as_bytes())?;
        db.sync_all()?;

        debug!("Registered {} {}", record.name, record.version);
        Ok(())
    }

    /// Drop a package's database line; absent names are a no-op
    pub fn unregister(&self, name: &str) -> Result<()> {
        let records = self.read_records()?;
        if !records.iter().any(|r| r.name == name) {
            return Ok(());
        }

        let remaining: Vec<InstalledRecord> =
            records.into_iter().filter(|r| r.name != name).collect();
        self.write_records(&remaining)?;
        debug!("Unregistered {}", name);
        Ok(())
    }

    /// Swap the record of an installed package for a new version in one rewrite
    pub fn replace(
        &self,
        record: &InstalledRecord,
        files: &OwnedFileManifest,
        deps: &[String],
    ) -> Result<()> {
        let mut records = self.read_records()?;
        let slot = records
            .iter_mut()
            .find(|r| r.name == record.name)
            .ok_or_else(|| Error::NotInstalled(record.name.clone()))?;
        *slot = record.clone();

        self.write_package_state(&record.name, files, deps)?;
        self.write_records(&records)?;
        debug!("Replaced record of {} with {}", record.name, record.version);
        Ok(())
    }

    fn write_package_state(
        &self,
        name: &str,
        files: &OwnedFileManifest,
        deps: &[String],
    ) -> Result<()> {
        let dir = self.layout.package_dir(name);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(PKGDEPS_FILE), render_dependency_list(deps).as_bytes())?;
        files.write(&dir.join(PKGTREE_FILE))
    }

    /// Copy a staged metadata section into a fresh record directory
    ///
    /// PKGTREE is never taken from an archive; the store writes its own at
    /// registration.
    pub fn install_metadata(&self, name: &str, metadata_dir: &Path) -> Result<()> {
        let dir = self.layout.package_dir(name);
        if dir.exists() {
            debug!("Clearing leftover record directory {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        copy_flat_dir(metadata_dir, &dir, &[PKGTREE_FILE])?;
        Ok(())
    }

    /// Copy install hooks into the record's `scripts/` directory
    pub fn install_scripts(&self, name: &str, scripts_dir: &Path) -> Result<Vec<PathBuf>> {
        if !scripts_dir.is_dir() {
            return Ok(Vec::new());
        }
        copy_flat_dir(scripts_dir, &self.layout.package_scripts_dir(name), &[])
    }

    /// Delete a package's record directory (metadata, manifest, scripts)
    pub fn delete_package_dir(&self, name: &str) -> Result<()> {
        match fs::remove_dir_all(self.layout.package_dir(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn has_package_dir(&self, name: &str) -> bool {
        self.layout.package_dir(name).is_dir()
    }

    pub fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        read_optional(&self.layout.package_dir(name).join(PKGDEPS_FILE))
            .map(|content| parse_dependency_list(&content))
    }

    pub fn owned_files(&self, name: &str) -> Result<OwnedFileManifest> {
        OwnedFileManifest::load(&self.layout.package_dir(name).join(PKGTREE_FILE))
    }

    /// Stored manifest of an installed package, dependencies included
    pub fn manifest(&self, name: &str) -> Result<PackageManifest> {
        let path = self.layout.package_dir(name).join(PKGINFO_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::NotInstalled(name.to_string())
            } else {
                Error::Io(e)
            }
        })?;
        let mut manifest = PackageManifest::parse_pkginfo(&content)?;
        manifest.dependencies = self.dependencies(name)?;
        Ok(manifest)
    }

    /// Release counter of an installed package (0 when unknown)
    pub fn release(&self, name: &str) -> Result<u32> {
        match self.manifest(name) {
            Ok(manifest) => Ok(manifest.release),
            Err(Error::NotInstalled(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Whether an installed package outside `excluding` declares `name` as a dependency
    pub fn is_dependency_of(&self, name: &str, excluding: &[&str]) -> Result<bool> {
        Ok(!self.dependents(name, excluding)?.is_empty())
    }

    /// Installed packages outside `excluding` that depend on `name`
    pub fn dependents(&self, name: &str, excluding: &[&str]) -> Result<Vec<String>> {
        let mut dependents = Vec::new();
        for record in self.read_records()? {
            if record.name == name || excluding.contains(&record.name.as_str()) {
                continue;
            }
            if self.dependencies(&record.name)?.iter().any(|d| d == name) {
                dependents.push(record.name);
            }
        }
        Ok(dependents)
    }

    /// Every path owned by installed packages outside `excluding`
    pub fn paths_owned_by_others(&self, excluding: &[&str]) -> Result<HashSet<PathBuf>> {
        let mut paths = HashSet::new();
        for record in self.read_records()? {
            if excluding.contains(&record.name.as_str()) {
                continue;
            }
            paths.extend(self.owned_files(&record.name)?.entries().iter().cloned());
        }
        Ok(paths)
    }

    /// Move a package's record directory aside ahead of an upgrade
    pub fn stash(&self, name: &str) -> Result<()> {
        let old = self.layout.old_package_dir(name);
        if old.exists() {
            fs::remove_dir_all(&old)?;
        }
        fs::rename(self.layout.package_dir(name), &old)?;
        debug!("Stashed record directory of {}", name);
        Ok(())
    }

    pub fn stashed_owned_files(&self, name: &str) -> Result<OwnedFileManifest> {
        OwnedFileManifest::load(&self.layout.old_package_dir(name).join(PKGTREE_FILE))
    }

    /// Put a stashed record directory back, discarding whatever replaced it
    pub fn restore_stash(&self, name: &str) -> Result<()> {
        self.delete_package_dir(name)?;
        fs::rename(self.layout.old_package_dir(name), self.layout.package_dir(name))?;
        debug!("Restored record directory of {}", name);
        Ok(())
    }

    pub fn discard_stash(&self, name: &str) -> Result<()> {
        match fs::remove_dir_all(self.layout.old_package_dir(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Names with a stashed record directory left behind
    pub fn stashed_packages(&self) -> Result<Vec<String>> {
        let dir = self.layout.packages_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().and_then(|n| n.strip_suffix(OLD_SUFFIX)) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Version recorded in a package's PKGINFO, if the record directory is complete
    pub fn committed_version(&self, name: &str) -> Result<Option<String>> {
        let dir = self.layout.package_dir(name);
        if !dir.join(PKGTREE_FILE).exists() {
            return Ok(None);
        }
        match self.manifest(name) {
            Ok(manifest) => Ok(Some(manifest.version)),
            Err(Error::NotInstalled(_)) | Err(Error::Manifest(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn read_optional(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::Io(e)),
    }
}
