// src/installer.rs

//! Package installation
//!
//! An install unpacks the archive into a private staging directory, commits
//! the payload into the target root while recording every path written, then
//! registers the package. Nothing reaches the store before the payload is in
//! place; a failed commit is rolled back through the paths it created and the
//! files it overwrote.

use crate::db::{InstalledRecord, LocalStateStore};
use crate::error::{Error, Result};
use crate::filesystem::{CommitLog, install_tree, remove_owned_paths};
use crate::hooks::{Hook, run_hook};
use crate::packages::{EvxArchive, StagedPackage};
use crate::resolver::{PackageSource, resolve_missing};
use crate::ui::Ui;
use tracing::{debug, info, warn};

pub struct Installer<'a> {
    store: &'a LocalStateStore,
    ui: &'a dyn Ui,
}

impl<'a> Installer<'a> {
    pub fn new(store: &'a LocalStateStore, ui: &'a dyn Ui) -> Self {
        Self { store, ui }
    }

    /// Install a single package whose dependencies are already present
    pub fn install(&self, archive: &EvxArchive) -> Result<InstalledRecord> {
        let name = archive.name();
        let manifest = archive.manifest();
        if self.store.is_installed(name)? {
            return Err(Error::Duplicate(name.to_string()));
        }

        let staged = self.stage(archive)?;
        self.run_pre_install(&staged)?;
        let log = self.commit(&staged)?;

        let record = InstalledRecord::now(name, &manifest.version);
        if let Err(e) = self
            .store
            .register(&record, &log.owned, &manifest.dependencies)
        {
            self.rollback(name, &log);
            return Err(e);
        }
        info!(
            "Installed {} {} ({} paths)",
            name,
            manifest.full_version(),
            log.owned.len()
        );

        self.run_post_install(name);
        Ok(record)
    }

    /// Install a package after every missing dependency it declares
    ///
    /// All dependency archives are retrieved before the first install, so an
    /// unknown dependency leaves the system untouched.
    pub fn install_with_dependencies(
        &self,
        archive: &EvxArchive,
        source: &mut dyn PackageSource,
    ) -> Result<InstalledRecord> {
        if !archive.manifest().dependencies.is_empty() {
            self.ui.info("Checking dependencies...");
        }
        let deps = resolve_missing(archive.manifest(), self.store, source)?;
        self.install_dependencies(&deps)?;

        self.ui.info(&format!("Installing package {}...", archive.name()));
        self.install(archive)
    }

    pub(crate) fn install_dependencies(&self, deps: &[EvxArchive]) -> Result<()> {
        for dep in deps {
            self.ui.info(&format!("Installing dependency {}...", dep.name()));
            self.install(dep)?;
            self.ui
                .success(&format!("Dependency {} installed successfully!", dep.name()));
        }
        if !deps.is_empty() {
            self.ui.info("Dependencies installed successfully!");
        }
        Ok(())
    }

    /// Unpack an archive under the state directory's staging area
    pub(crate) fn stage(&self, archive: &EvxArchive) -> Result<StagedPackage> {
        archive.unpack(&self.store.layout().staging_dir())
    }

    /// A failing pre-install hook aborts before anything is committed
    pub(crate) fn run_pre_install(&self, staged: &StagedPackage) -> Result<()> {
        let layout = self.store.layout();
        if !layout.is_live() {
            return Ok(());
        }
        run_hook(layout, &staged.scripts_dir(), Hook::PreInstall)?;
        Ok(())
    }

    /// Copy payload, metadata and scripts of a staged package into place
    ///
    /// On failure every overwritten file gets its previous content back, every
    /// path this commit created is removed again and the record directory is
    /// dropped. The backups live as long as `staged`.
    pub(crate) fn commit(&self, staged: &StagedPackage) -> Result<CommitLog> {
        let mut log = CommitLog::with_backups(staged.backup_dir());
        match self.commit_into(staged, &mut log) {
            Ok(()) => Ok(log),
            Err(e) => {
                self.rollback(staged.name(), &log);
                Err(e)
            }
        }
    }

    fn commit_into(&self, staged: &StagedPackage, log: &mut CommitLog) -> Result<()> {
        let name = staged.name();
        install_tree(
            &staged.data_dir(),
            self.store.layout(),
            staged.ownership(),
            log,
        )?;
        self.store.install_metadata(name, &staged.metadata_dir())?;
        let scripts = self.store.install_scripts(name, &staged.scripts_dir())?;
        debug!("Committed {} ({} scripts)", name, scripts.len());
        Ok(())
    }

    /// Best-effort undo of a commit; errors are logged, never returned
    pub(crate) fn rollback(&self, name: &str, log: &CommitLog) {
        warn!(
            "Rolling back {} ({} new paths, {} overwritten)",
            name,
            log.created.len(),
            log.replaced.len()
        );
        log.restore_replaced(self.store.layout());
        if let Err(e) = remove_owned_paths(self.store.layout(), log.created.iter()) {
            warn!("Failed to remove files of {}: {}", name, e);
        }
        if let Err(e) = self.store.delete_package_dir(name) {
            warn!("Failed to remove record directory of {}: {}", name, e);
        }
    }

    /// Post-install failures are reported; the package stays installed
    pub(crate) fn run_post_install(&self, name: &str) {
        let layout = self.store.layout();
        if !layout.is_live() {
            debug!("Skipping post-install hook of {} outside the live system", name);
            return;
        }
        if let Err(e) = run_hook(layout, &layout.package_scripts_dir(name), Hook::PostInstall) {
            self.ui
                .warn(&format!("Post-install hook of {} failed: {}", name, e));
        }
    }
}
