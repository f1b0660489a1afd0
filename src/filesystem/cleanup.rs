// src/filesystem/cleanup.rs

//! Directory-aware removal of owned paths
//!
//! Files and symlinks are deleted as they are encountered. Directories are
//! collected and visited in reverse manifest order, so children go before
//! their parents, and only removed once empty. A directory still holding
//! foreign files (or files of another package) is left in place.

use crate::error::{Error, Result};
use crate::layout::Layout;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// What a cleanup pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// Directories kept because something else still lives in them
    pub kept_dirs: Vec<PathBuf>,
    /// Entries already gone before the pass
    pub missing: usize,
}

/// Remove root-relative `entries` under the layout's root
pub fn remove_owned_paths<'a, I>(layout: &Layout, entries: I) -> Result<CleanupReport>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut report = CleanupReport::default();
    let mut dirs = Vec::new();

    for relative in entries {
        if !is_safe_relative(relative) {
            warn!("Skipping unsafe manifest entry: {}", relative.display());
            continue;
        }
        let path = layout.resolve(relative);

        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report.missing += 1;
                continue;
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if meta.file_type().is_symlink() {
            if fs::metadata(&path).is_err() {
                debug!("Removing dangling symlink {}", path.display());
            }
            remove_file(&path, &mut report)?;
        } else if meta.is_dir() {
            dirs.push(path);
        } else {
            remove_file(&path, &mut report)?;
        }
    }

    for dir in dirs.into_iter().rev() {
        let is_empty = match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::Io(e)),
        };

        if is_empty {
            match fs::remove_dir(&dir) {
                Ok(()) => report.removed_dirs += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        } else {
            debug!("Keeping non-empty directory {}", dir.display());
            report.kept_dirs.push(dir);
        }
    }

    Ok(report)
}

fn remove_file(path: &Path, report: &mut CleanupReport) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            report.removed_files += 1;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Manifest entries must stay below the root and never name the root itself
fn is_safe_relative(path: &Path) -> bool {
    let mut has_normal = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return false,
        }
    }
    has_normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn paths(entries: &[&str]) -> Vec<PathBuf> {
        entries.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_removes_files_then_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(dir.path().join("usr/share/foo")).unwrap();
        fs::write(dir.path().join("usr/share/foo/data"), "x").unwrap();

        let entries = paths(&["usr", "usr/share", "usr/share/foo", "usr/share/foo/data"]);
        let report = remove_owned_paths(&layout, entries.iter().map(PathBuf::as_path)).unwrap();

        assert_eq!(report.removed_files, 1);
        assert_eq!(report.removed_dirs, 3);
        assert!(!dir.path().join("usr").exists());
    }

    #[test]
    fn test_shared_directory_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(dir.path().join("usr/bin")).unwrap();
        fs::write(dir.path().join("usr/bin/mine"), "x").unwrap();
        fs::write(dir.path().join("usr/bin/foreign"), "y").unwrap();

        let entries = paths(&["usr", "usr/bin", "usr/bin/mine"]);
        let report = remove_owned_paths(&layout, entries.iter().map(PathBuf::as_path)).unwrap();

        assert!(!dir.path().join("usr/bin/mine").exists());
        assert!(dir.path().join("usr/bin/foreign").exists());
        assert_eq!(report.removed_dirs, 0);
        assert_eq!(report.kept_dirs.len(), 2);
    }

    #[test]
    fn test_dangling_symlink_removed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        symlink("gone.so.1", dir.path().join("lib/gone.so")).unwrap();

        let entries = paths(&["lib", "lib/gone.so"]);
        remove_owned_paths(&layout, entries.iter().map(PathBuf::as_path)).unwrap();

        assert!(fs::symlink_metadata(dir.path().join("lib/gone.so")).is_err());
        assert!(!dir.path().join("lib").exists());
    }

    #[test]
    fn test_missing_and_unsafe_entries_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("victim"), "keep").unwrap();
        let layout = Layout::new(dir.path());

        let escape = PathBuf::from("../").join(outside.path().file_name().unwrap()).join("victim");
        let entries = vec![PathBuf::from("not/here"), escape, PathBuf::from("/")];
        let report = remove_owned_paths(&layout, entries.iter().map(PathBuf::as_path)).unwrap();

        assert_eq!(report.missing, 1);
        assert!(outside.path().join("victim").exists());
        assert!(dir.path().exists());
    }
}
