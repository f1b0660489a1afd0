// src/resolver.rs

//! Dependency walker
//!
//! Shared by the installer (which packages must be installed first), the
//! remover (which dependencies may go with a package) and the `tree` command.
//! Dependencies are plain package names; there is no version constraint
//! solving.

use crate::db::LocalStateStore;
use crate::error::{Error, Result};
use crate::packages::{EvxArchive, PackageManifest};
use crate::repository::IndexEntry;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Where packages that are not installed yet come from
pub trait PackageSource {
    /// Newest available version of `name`, if any repository carries it
    fn lookup(&self, name: &str) -> Result<Option<IndexEntry>>;

    /// Retrieve and open the archive of `name`
    ///
    /// Fails with `DependencyNotFound` when no repository carries it.
    fn fetch(&mut self, name: &str) -> Result<EvxArchive>;
}

/// Missing dependencies of `manifest`, in install order
///
/// Every archive is fetched before anything is installed, so a dependency
/// that cannot be found aborts the whole operation. Installed packages are
/// skipped and each name appears once; dependencies precede their dependents.
pub fn resolve_missing(
    manifest: &PackageManifest,
    store: &LocalStateStore,
    source: &mut dyn PackageSource,
) -> Result<Vec<EvxArchive>> {
    let mut walk = InstallWalk {
        store,
        source,
        path: vec![manifest.name.clone()],
        seen: HashSet::new(),
        order: Vec::new(),
    };
    walk.visit(manifest)?;

    debug!(
        "{} needs {} missing package(s): {:?}",
        manifest.name,
        walk.order.len(),
        walk.order.iter().map(EvxArchive::name).collect::<Vec<_>>()
    );
    Ok(walk.order)
}

struct InstallWalk<'a> {
    store: &'a LocalStateStore,
    source: &'a mut dyn PackageSource,
    path: Vec<String>,
    seen: HashSet<String>,
    order: Vec<EvxArchive>,
}

impl InstallWalk<'_> {
    fn visit(&mut self, manifest: &PackageManifest) -> Result<()> {
        for dep in &manifest.dependencies {
            if self.seen.contains(dep) || self.store.is_installed(dep)? {
                continue;
            }
            if let Some(pos) = self.path.iter().position(|p| p == dep) {
                let mut cycle = self.path[pos..].to_vec();
                cycle.push(dep.clone());
                return Err(Error::CyclicDependency(cycle));
            }

            let archive = self.source.fetch(dep)?;
            self.path.push(dep.clone());
            self.visit(archive.manifest())?;
            self.path.pop();

            self.seen.insert(dep.clone());
            self.order.push(archive);
        }
        Ok(())
    }
}

/// Outcome of planning the removal of a package together with its dependencies
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    /// Dependencies that can go, each listed after its own dependencies
    pub removable: Vec<String>,
    /// Installed dependencies that must stay
    pub retained: Vec<String>,
}

/// Plan which installed dependencies of `name` can be removed along with it
///
/// A dependency is removable when no installed package outside the removal
/// set still depends on it. Names in `pinned` are never removed, and neither
/// is anything they depend on.
pub fn resolve_removable(
    name: &str,
    store: &LocalStateStore,
    pinned: &[&str],
) -> Result<RemovalPlan> {
    let mut candidates = Vec::new();
    let mut visited = HashSet::from([name.to_string()]);
    collect_installed_deps(name, store, &mut visited, &mut candidates)?;

    let mut removal: HashSet<String> = candidates
        .iter()
        .filter(|c| !pinned.contains(&c.as_str()))
        .cloned()
        .collect();
    removal.insert(name.to_string());

    // Drop candidates still needed from outside the set until nothing changes
    loop {
        let excluding: Vec<&str> = removal.iter().map(String::as_str).collect();
        let mut needed = Vec::new();
        for candidate in &candidates {
            if removal.contains(candidate) && store.is_dependency_of(candidate, &excluding)? {
                needed.push(candidate.clone());
            }
        }
        if needed.is_empty() {
            break;
        }
        for candidate in needed {
            removal.remove(&candidate);
        }
    }

    let (removable, retained): (Vec<String>, Vec<String>) = candidates
        .into_iter()
        .partition(|c| removal.contains(c));
    Ok(RemovalPlan {
        removable,
        retained,
    })
}

/// Installed dependencies of `name`, post-order; cycles are not re-entered
fn collect_installed_deps(
    name: &str,
    store: &LocalStateStore,
    visited: &mut HashSet<String>,
    out: &mut Vec<String>,
) -> Result<()> {
    for dep in store.dependencies(name)? {
        if !visited.insert(dep.clone()) || !store.is_installed(&dep)? {
            continue;
        }
        collect_installed_deps(&dep, store, visited, out)?;
        out.push(dep);
    }
    Ok(())
}

/// Installed dependency tree of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTree {
    pub name: String,
    /// Installed version, `None` for a dependency that is not installed
    pub version: Option<String>,
    /// Set when the name already appears higher up on the same branch
    pub cyclic: bool,
    pub children: Vec<DependencyTree>,
}

/// Build the dependency tree of an installed package
pub fn dependency_tree(name: &str, store: &LocalStateStore) -> Result<DependencyTree> {
    if !store.is_installed(name)? {
        return Err(Error::NotInstalled(name.to_string()));
    }
    let mut path = Vec::new();
    build_tree(name, store, &mut path)
}

fn build_tree(name: &str, store: &LocalStateStore, path: &mut Vec<String>) -> Result<DependencyTree> {
    let version = store.find(name)?.map(|r| r.version);
    if path.iter().any(|p| p == name) {
        return Ok(DependencyTree {
            name: name.to_string(),
            version,
            cyclic: true,
            children: Vec::new(),
        });
    }

    let mut children = Vec::new();
    if version.is_some() {
        path.push(name.to_string());
        for dep in store.dependencies(name)? {
            children.push(build_tree(&dep, store, path)?);
        }
        path.pop();
    }

    Ok(DependencyTree {
        name: name.to_string(),
        version,
        cyclic: false,
        children,
    })
}

impl DependencyTree {
    fn render(&self, f: &mut fmt::Formatter<'_>, prefix: &str, last: bool, top: bool) -> fmt::Result {
        let connector = match (top, last) {
            (true, _) => "",
            (false, true) => "`-- ",
            (false, false) => "|-- ",
        };
        let label = match (&self.version, self.cyclic) {
            (_, true) => format!("{} (cycle)", self.name),
            (Some(version), false) => format!("{} {}", self.name, version),
            (None, false) => format!("{} (not installed)", self.name),
        };
        writeln!(f, "{}{}{}", prefix, connector, label)?;

        let child_prefix = match (top, last) {
            (true, _) => String::new(),
            (false, true) => format!("{}    ", prefix),
            (false, false) => format!("{}|   ", prefix),
        };
        for (i, child) in self.children.iter().enumerate() {
            child.render(f, &child_prefix, i + 1 == self.children.len(), false)?;
        }
        Ok(())
    }
}

impl fmt::Display for DependencyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, "", true, true)
    }
}
