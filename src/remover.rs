// src/remover.rs

//! Package removal
//!
//! Removal goes dependencies first, then the package's own files, then its
//! record directory, and finally its database line. Paths also owned by
//! another installed package are left alone.

use crate::db::LocalStateStore;
use crate::error::{Error, Result};
use crate::filesystem::remove_owned_paths;
use crate::resolver::resolve_removable;
use crate::ui::Ui;
use tracing::{debug, info};

/// Packages that are never removed
pub const PROTECTED_PACKAGES: &[&str] = &["evox", "base", "glibc", "linux", "bash", "coreutils"];

pub fn is_protected(name: &str) -> bool {
    PROTECTED_PACKAGES.contains(&name)
}

pub struct Remover<'a> {
    store: &'a LocalStateStore,
    ui: &'a dyn Ui,
}

impl<'a> Remover<'a> {
    pub fn new(store: &'a LocalStateStore, ui: &'a dyn Ui) -> Self {
        Self { store, ui }
    }

    /// Remove `name`, and with `with_deps` every dependency nothing else needs
    pub fn remove(&self, name: &str, with_deps: bool) -> Result<()> {
        if is_protected(name) {
            return Err(Error::ProtectedPackage(name.to_string()));
        }
        if !self.store.is_installed(name)? {
            return Err(Error::NotInstalled(name.to_string()));
        }

        if with_deps {
            self.remove_dependencies(name)?;
        }
        self.remove_one(name)
    }

    fn remove_dependencies(&self, name: &str) -> Result<()> {
        let plan = resolve_removable(name, self.store, PROTECTED_PACKAGES)?;

        for dep in &plan.retained {
            if is_protected(dep) {
                self.ui
                    .info(&format!("Package {} is protected, not removing it", dep));
            } else {
                self.ui.info(&format!(
                    "Package {} is a dependency of another package, not removing it",
                    dep
                ));
            }
        }

        let mut pending: Vec<&str> = plan.removable.iter().map(String::as_str).collect();
        pending.push(name);

        for dep in &plan.removable {
            // The plan is a snapshot; check again against what is installed now
            if self.store.is_dependency_of(dep, &pending)? {
                self.ui.info(&format!(
                    "Package {} is a dependency of another package, not removing it",
                    dep
                ));
                pending.retain(|p| *p != dep.as_str());
                continue;
            }

            self.ui.info(&format!("Removing dependency {}", dep));
            self.remove_one(dep)?;
            self.ui.success(&format!("Removed dependency {}", dep));
            pending.retain(|p| *p != dep.as_str());
        }
        Ok(())
    }

    /// Delete one package's unshared paths and forget it
    fn remove_one(&self, name: &str) -> Result<()> {
        let owned = self.store.owned_files(name)?;
        let shared = self.store.paths_owned_by_others(&[name])?;
        let report = remove_owned_paths(self.store.layout(), owned.without(&shared).iter())?;
        debug!(
            "Cleaned up {}: {} files, {} directories removed, {} directories kept, {} missing",
            name,
            report.removed_files,
            report.removed_dirs,
            report.kept_dirs.len(),
            report.missing
        );

        self.store.delete_package_dir(name)?;
        self.store.unregister(name)?;
        info!("Removed {}", name);
        Ok(())
    }
}
