// src/upgrade.rs

//! Upgrade orchestration
//!
//! An upgrade never unregisters the package. The old record directory is
//! moved aside to `<name>.old`, the new payload is committed over the old
//! one, the database line is swapped in a single rewrite, and only then are
//! the paths the new version no longer owns cleaned up. A leftover
//! `<name>.old` means a run was interrupted; `recover` settles it.

use crate::db::{InstalledRecord, LocalStateStore, OwnedFileManifest};
use crate::error::{Error, Result};
use crate::filesystem::remove_owned_paths;
use crate::installer::Installer;
use crate::packages::EvxArchive;
use crate::resolver::{PackageSource, resolve_missing};
use crate::ui::Ui;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    UpToDate,
    /// No configured repository carries the package
    NotInRepository,
    Upgraded { from: String, to: String },
}

/// Whether `(remote_version, remote_release)` supersedes the installed version
///
/// Any change of version counts, the index being authoritative; within one
/// version only a higher release does.
pub fn is_upgrade_due(
    local_version: &str,
    local_release: u32,
    remote_version: &str,
    remote_release: u32,
) -> bool {
    local_version != remote_version || remote_release > local_release
}

/// True when both versions are semver and the remote one is older
fn is_downgrade(local_version: &str, remote_version: &str) -> bool {
    match (
        semver::Version::parse(local_version),
        semver::Version::parse(remote_version),
    ) {
        (Ok(local), Ok(remote)) => remote < local,
        _ => false,
    }
}

pub struct Upgrader<'a> {
    store: &'a LocalStateStore,
    ui: &'a dyn Ui,
}

impl<'a> Upgrader<'a> {
    pub fn new(store: &'a LocalStateStore, ui: &'a dyn Ui) -> Self {
        Self { store, ui }
    }

    /// Bring one installed package up to the version its repository offers
    pub fn upgrade(&self, name: &str, source: &mut dyn PackageSource) -> Result<UpgradeOutcome> {
        let record = self
            .store
            .find(name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        let Some(entry) = source.lookup(name)? else {
            debug!("{} is not carried by any repository", name);
            return Ok(UpgradeOutcome::NotInRepository);
        };

        let local_release = self.store.release(name)?;
        if !is_upgrade_due(&record.version, local_release, &entry.version, entry.release) {
            debug!("{} {}-{} is up to date", name, record.version, local_release);
            return Ok(UpgradeOutcome::UpToDate);
        }

        let from = format!("{}-{}", record.version, local_release);
        let to = format!("{}-{}", entry.version, entry.release);
        if is_downgrade(&record.version, &entry.version) {
            warn!("Repository version of {} is older than the installed one", name);
            self.ui.warn(&format!(
                "The repository offers {} {}, older than the installed {}",
                name, to, from
            ));
        }

        self.ui.info(&format!(
            "The package {} is being upgraded from version {} to version {}.",
            name, from, to
        ));
        let archive = source.fetch(name)?;
        self.reinstall(&archive, source)?;
        self.ui.success(&format!(
            "The package {} has been upgraded from version {} to version {}.",
            name, from, to
        ));

        Ok(UpgradeOutcome::Upgraded { from, to })
    }

    /// Replace an installed package with `archive`, whatever its version
    ///
    /// New dependencies are installed first.
    pub fn reinstall(
        &self,
        archive: &EvxArchive,
        source: &mut dyn PackageSource,
    ) -> Result<InstalledRecord> {
        let deps = resolve_missing(archive.manifest(), self.store, source)?;
        Installer::new(self.store, self.ui).install_dependencies(&deps)?;
        self.apply(archive)
    }

    /// Swap the installed copy of a package for the content of `archive`
    pub fn apply(&self, archive: &EvxArchive) -> Result<InstalledRecord> {
        let name = archive.name();
        let manifest = archive.manifest();
        if !self.store.is_installed(name)? {
            return Err(Error::NotInstalled(name.to_string()));
        }

        let installer = Installer::new(self.store, self.ui);
        let staged = installer.stage(archive)?;
        installer.run_pre_install(&staged)?;

        self.store.stash(name)?;
        let log = match installer.commit(&staged) {
            Ok(log) => log,
            Err(e) => {
                self.restore(name);
                return Err(e);
            }
        };

        let record = InstalledRecord::now(name, &manifest.version);
        if let Err(e) = self
            .store
            .replace(&record, &log.owned, &manifest.dependencies)
        {
            installer.rollback(name, &log);
            self.restore(name);
            return Err(e);
        }

        // From here on the new version is the installed one
        self.finish(name, &log.owned)?;

        info!("Upgraded {} to {}", name, manifest.full_version());
        installer.run_post_install(name);
        Ok(record)
    }

    /// Remove what the stashed version owned and `owned` no longer lists,
    /// then drop the stash
    fn finish(&self, name: &str, owned: &OwnedFileManifest) -> Result<()> {
        let stale = self
            .store
            .stashed_owned_files(name)?
            .stale_against(owned)
            .without(&self.store.paths_owned_by_others(&[name])?);
        let report = remove_owned_paths(self.store.layout(), stale.iter())?;
        debug!(
            "Dropped {} stale files and {} directories of {}",
            report.removed_files, report.removed_dirs, name
        );
        self.store.discard_stash(name)
    }

    fn restore(&self, name: &str) {
        if let Err(e) = self.store.restore_stash(name) {
            warn!("Failed to restore record directory of {}: {}", name, e);
        }
    }

    /// Settle record directories left aside by an interrupted upgrade
    ///
    /// The new record directory is kept when it is complete and the database
    /// already carries its version; otherwise the old one is put back.
    pub fn recover(&self) -> Result<Vec<String>> {
        let mut recovered = Vec::new();
        for name in self.store.stashed_packages()? {
            let committed = self.store.committed_version(&name)?;
            let registered = self.store.find(&name)?.map(|r| r.version);

            match (committed, registered) {
                (Some(new), Some(db)) if new == db => {
                    info!("Keeping upgraded {} {}", name, new);
                    let owned = self.store.owned_files(&name)?;
                    self.finish(&name, &owned)?;
                }
                _ => {
                    warn!("Restoring {} from an interrupted upgrade", name);
                    self.store.restore_stash(&name)?;
                }
            }
            recovered.push(name);
        }
        Ok(recovered)
    }
}
