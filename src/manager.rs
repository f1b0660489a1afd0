// src/manager.rs

//! Command layer
//!
//! `PackageManager` runs one CLI command against a root: it reads the
//! configuration once, takes the state lock for anything that mutates, and
//! wires the store, repositories, installer, remover and upgrader together.

use crate::config::Config;
use crate::db::{InstalledRecord, LocalStateStore, StateLock};
use crate::error::{Error, Result};
use crate::installer::Installer;
use crate::layout::Layout;
use crate::packages::{EvxArchive, PackageManifest, name_from_archive_path};
use crate::remover::Remover;
use crate::repository::{Repositories, SearchHit, Transport, is_url};
use crate::resolver::{DependencyTree, PackageSource, dependency_tree};
use crate::ui::Ui;
use crate::upgrade::{UpgradeOutcome, Upgrader};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// System-wide configuration copied into a fresh alternate root
const HOST_CONFIG: &str = "/etc/evox.conf";

/// Stored details of an installed package
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub manifest: PackageManifest,
    pub install_date: String,
}

pub struct PackageManager<'a> {
    layout: Layout,
    ui: &'a dyn Ui,
    transport: &'a dyn Transport,
}

impl<'a> PackageManager<'a> {
    pub fn new(layout: Layout, ui: &'a dyn Ui, transport: &'a dyn Transport) -> Self {
        Self {
            layout,
            ui,
            transport,
        }
    }

    fn store(&self) -> LocalStateStore {
        LocalStateStore::new(self.layout.clone())
    }

    /// Install each target: a local `.evx` file, a URL, or a package name
    pub fn get(&self, targets: &[String], assume_yes: bool) -> Result<()> {
        let _lock = StateLock::acquire(&self.layout)?;
        let config = Config::load_or_default(&self.layout)?;
        let store = self.store();
        let mut repos = Repositories::new(&self.layout, &config, self.transport);

        for target in targets {
            self.get_one(target, assume_yes, &store, &mut repos)?;
        }
        Ok(())
    }

    fn get_one(
        &self,
        target: &str,
        assume_yes: bool,
        store: &LocalStateStore,
        repos: &mut Repositories<'_>,
    ) -> Result<()> {
        let archive = if Path::new(target).is_file() {
            EvxArchive::open_file(target)?
        } else if is_url(target) {
            let path = repos.download(target)?;
            let name = name_from_archive_path(&path)?;
            EvxArchive::open(&path, &name)?
        } else {
            if store.is_installed(target)? && assume_yes {
                self.ui
                    .info(&format!("Package {} is already installed, skipping", target));
                return Ok(());
            }
            repos.fetch(target)?
        };

        let file_name = archive
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if store.is_installed(archive.name())? {
            if assume_yes {
                self.ui.info(&format!(
                    "Package {} is already installed, skipping",
                    archive.name()
                ));
                return Ok(());
            }
            self.ui.error("This package is already installed.");
            if !self.ui.confirm("Do you want to reinstall it?") {
                return Ok(());
            }

            self.ui
                .info(&format!("Installing package from file {}...", file_name));
            Upgrader::new(store, self.ui).reinstall(&archive, repos)?;
            self.ui.success("Package installed successfully!");
            return Ok(());
        }

        self.ui
            .info(&format!("Installing package from file {}...", file_name));
        self.show_manifest(archive.manifest());
        if !assume_yes && !self.ui.confirm("Do you want to install this package?") {
            info!("Installation of {} declined", archive.name());
            return Ok(());
        }

        Installer::new(store, self.ui).install_with_dependencies(&archive, repos)?;
        self.ui.success("Package installed successfully!");
        Ok(())
    }

    fn show_manifest(&self, manifest: &PackageManifest) {
        self.ui.info(&format!("Package name: {}", manifest.name));
        self.ui
            .info(&format!("Package version: {}", manifest.full_version()));
        self.ui
            .info(&format!("Package description: {}", manifest.description));
        if let Some(url) = &manifest.url {
            self.ui.info(&format!("Package url: {}", url));
        }
        if let Some(license) = &manifest.license {
            self.ui.info(&format!("Package license: {}", license));
        }
    }

    pub fn remove(&self, names: &[String], with_deps: bool) -> Result<()> {
        let _lock = StateLock::acquire(&self.layout)?;
        let store = self.store();
        let remover = Remover::new(&store, self.ui);

        for name in names {
            self.ui.info(&format!("Removing package {}...", name));
            remover.remove(name, with_deps)?;
            self.ui
                .success(&format!("Package {} removed successfully!", name));
        }
        Ok(())
    }

    /// Upgrade every installed package the repositories offer a newer build of
    pub fn upgrade_all(&self) -> Result<usize> {
        let _lock = StateLock::acquire(&self.layout)?;
        let config = Config::load(&self.layout)?;
        let store = self.store();
        let upgrader = Upgrader::new(&store, self.ui);

        for name in upgrader.recover()? {
            self.ui
                .warn(&format!("Recovered {} from an interrupted upgrade", name));
        }

        let mut repos = Repositories::new(&self.layout, &config, self.transport);
        repos.ensure_synced()?;

        let mut upgraded = 0;
        for record in store.list_installed()? {
            match upgrader.upgrade(&record.name, &mut repos)? {
                UpgradeOutcome::Upgraded { .. } => upgraded += 1,
                UpgradeOutcome::UpToDate => {}
                UpgradeOutcome::NotInRepository => {
                    debug!("{} is not available in any repository", record.name)
                }
            }
        }

        if upgraded == 0 {
            self.ui.info("All packages are up to date.");
        }
        Ok(upgraded)
    }

    pub fn sync(&self) -> Result<usize> {
        let _lock = StateLock::acquire(&self.layout)?;
        let config = Config::load(&self.layout)?;
        let repos = Repositories::new(&self.layout, &config, self.transport);
        let synced = repos.sync_all(self.ui)?;
        if synced == 0 {
            self.ui.warn("No repositories configured.");
        }
        Ok(synced)
    }

    /// Prepare the state directory of the root
    ///
    /// Safe to run again; it also clears staging leftovers of killed runs.
    pub fn init(&self) -> Result<()> {
        let _lock = StateLock::acquire(&self.layout)?;

        fs::create_dir_all(self.layout.root().join("etc"))?;
        let config_path = self.layout.config_path();
        if !self.layout.is_live() && !config_path.exists() && Path::new(HOST_CONFIG).is_file() {
            fs::copy(HOST_CONFIG, &config_path)?;
            info!("Copied {} into {}", HOST_CONFIG, self.layout.root().display());
        }

        self.store().init()?;

        let config = Config::load_or_default(&self.layout)?;
        for repo in config.repositories() {
            fs::create_dir_all(self.layout.repo_dir(&repo.name))?;
        }

        let staging = self.layout.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        self.ui.success(&format!(
            "Initialized evox in {}",
            self.layout.state_dir().display()
        ));
        Ok(())
    }

    pub fn search(&self, expr: &str) -> Result<Vec<(SearchHit, Option<String>)>> {
        let config = Config::load(&self.layout)?;
        let store = self.store();
        let repos = Repositories::new(&self.layout, &config, self.transport);

        let mut results = Vec::new();
        for hit in repos.search(expr)? {
            let installed = match store.find(&hit.entry.name)? {
                Some(record) => Some(format!(
                    "{}-{}",
                    record.version,
                    store.release(&record.name)?
                )),
                None => None,
            };
            results.push((hit, installed));
        }
        Ok(results)
    }

    pub fn info(&self, name: &str) -> Result<PackageInfo> {
        let store = self.store();
        let record = store
            .find(name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;
        Ok(PackageInfo {
            manifest: store.manifest(name)?,
            install_date: record.install_date,
        })
    }

    pub fn tree(&self, name: &str) -> Result<DependencyTree> {
        dependency_tree(name, &self.store())
    }

    pub fn list(&self) -> Result<Vec<InstalledRecord>> {
        self.store().list_installed()
    }
}
