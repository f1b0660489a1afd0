// src/filesystem/mod.rs

//! Filesystem operations for deploying and removing package payloads
//!
//! - Committing a staged payload into the target root while recording every
//!   path in an `OwnedFileManifest`
//! - Directory-aware cleanup of owned paths (see `cleanup`)
//! - Atomic file rewrites for state files

pub mod cleanup;

pub use cleanup::{CleanupReport, remove_owned_paths};

use crate::db::OwnedFileManifest;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::packages::evx::Ownership;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{lchown, symlink};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of recreating a symlink at its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkOutcome {
    Created,
    /// Something already exists at the destination; left untouched
    AlreadyExists,
}

/// Create `link` pointing at `target` unless an entry already exists there
///
/// Only the "already exists" case is absorbed; permission and other errors
/// are returned to the caller.
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<SymlinkOutcome> {
    match symlink(target, link) {
        Ok(()) => Ok(SymlinkOutcome::Created),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(SymlinkOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

/// A file overwritten by a commit and the copy of its previous content
#[derive(Debug, Clone)]
pub struct Replaced {
    pub relative: PathBuf,
    pub backup: PathBuf,
}

/// Paths written while committing a payload
#[derive(Debug, Default)]
pub struct CommitLog {
    /// Everything the package now owns, in write order
    pub owned: OwnedFileManifest,
    /// Entries that did not exist before this commit
    pub created: OwnedFileManifest,
    /// Entries whose previous content was set aside before overwriting
    pub replaced: Vec<Replaced>,
    backup_dir: Option<PathBuf>,
}

impl CommitLog {
    /// A log that keeps the previous content of every overwritten file in
    /// `backup_dir`, so a failed commit can be undone completely
    pub fn with_backups(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: Some(backup_dir.into()),
            ..Self::default()
        }
    }

    fn back_up(&mut self, relative: &Path, dest: &Path) -> Result<()> {
        let Some(dir) = &self.backup_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        let backup = dir.join(self.replaced.len().to_string());
        preserve_entry(dest, &backup)?;
        self.replaced.push(Replaced {
            relative: relative.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Put the previous content of every overwritten file back in place
    ///
    /// Errors are logged; every entry is attempted.
    pub fn restore_replaced(&self, layout: &Layout) {
        for replaced in self.replaced.iter().rev() {
            let dest = layout.resolve(&replaced.relative);
            if let Err(e) = restore_entry(&replaced.backup, &dest) {
                warn!("Failed to restore {}: {}", dest.display(), e);
            }
        }
    }
}

/// Keep the entry at `path` reachable from `backup`
///
/// A hard link keeps the original inode (owner, mode, content) alive once
/// the path is renamed over; across filesystems the entry is copied.
fn preserve_entry(path: &Path, backup: &Path) -> io::Result<()> {
    if fs::hard_link(path, backup).is_ok() {
        return Ok(());
    }
    if fs::symlink_metadata(path)?.file_type().is_symlink() {
        symlink(fs::read_link(path)?, backup)
    } else {
        fs::copy(path, backup).map(|_| ())
    }
}

fn restore_entry(backup: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(backup, dest).is_ok() {
        return Ok(());
    }
    if fs::symlink_metadata(backup)?.file_type().is_symlink() {
        match fs::remove_file(dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        symlink(fs::read_link(backup)?, dest)
    } else {
        fs::copy(backup, dest).map(|_| ())
    }
}

/// What committing a directory entry found at its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirState {
    Created,
    Existing,
    /// A symlink to a directory; followed but never owned
    Symlinked,
}

/// Copy a staged payload tree into the target root
///
/// Entries are visited parent-first in name order. Directories that already
/// exist are adopted as-is; new directories, files and symlinks receive the
/// mode and (when permitted) the owner recorded in the archive.
pub fn install_tree(
    source: &Path,
    layout: &Layout,
    ownership: &Ownership,
    log: &mut CommitLog,
) -> Result<()> {
    if !source.is_dir() {
        debug!("No payload at {}", source.display());
        return Ok(());
    }
    install_dir_contents(source, Path::new(""), layout, ownership, log)
}

fn install_dir_contents(
    source_root: &Path,
    relative_dir: &Path,
    layout: &Layout,
    ownership: &Ownership,
    log: &mut CommitLog,
) -> Result<()> {
    let mut entries = fs::read_dir(source_root.join(relative_dir))?
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let relative = relative_dir.join(entry.file_name());
        let source = entry.path();
        let dest = layout.resolve(&relative);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            match install_directory(&source, &dest)? {
                DirState::Created => {
                    apply_ownership(&dest, ownership.get(&relative))?;
                    log.created.push(&relative);
                    log.owned.push(&relative);
                }
                DirState::Existing => log.owned.push(&relative),
                DirState::Symlinked => {
                    debug!("{} is a symlink to a directory, not taking ownership", dest.display());
                }
            }
            install_dir_contents(source_root, &relative, layout, ownership, log)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&source)?;
            match create_symlink(&target, &dest) {
                Ok(SymlinkOutcome::Created) => {
                    apply_ownership(&dest, ownership.get(&relative))?;
                    log.created.push(&relative);
                }
                Ok(SymlinkOutcome::AlreadyExists) => {
                    debug!("Symlink {} already exists, keeping it", dest.display());
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    warn!("Permission denied creating symlink {}", dest.display());
                    return Err(Error::Io(e));
                }
                Err(e) => return Err(Error::Io(e)),
            }
            log.owned.push(&relative);
        } else {
            let existing = dest.symlink_metadata().ok();
            match &existing {
                Some(meta) if !meta.is_dir() => log.back_up(&relative, &dest)?,
                _ => {}
            }
            install_file(&source, &dest)?;
            apply_ownership(&dest, ownership.get(&relative))?;
            if existing.is_none() {
                log.created.push(&relative);
            }
            log.owned.push(&relative);
        }
    }

    Ok(())
}

/// Materialize a directory unless one is already reachable at `dest`
fn install_directory(source: &Path, dest: &Path) -> Result<DirState> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => return Ok(DirState::Existing),
        Ok(meta) if meta.file_type().is_symlink() && dest.is_dir() => {
            return Ok(DirState::Symlinked);
        }
        Ok(_) => {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", dest.display()),
            )));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::Io(e)),
    }

    fs::create_dir(dest)?;
    fs::set_permissions(dest, fs::metadata(source)?.permissions())?;
    Ok(DirState::Created)
}

/// Copy a regular file, replacing any existing entry through a rename
fn install_file(source: &Path, dest: &Path) -> Result<()> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dest.with_file_name(format!(".{}.evox-new", file_name));

    // fs::copy carries the permission bits over
    if let Err(e) = fs::copy(source, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(Error::Io(e));
    }
    fs::rename(&temp, dest).map_err(|e| {
        let _ = fs::remove_file(&temp);
        Error::Io(e)
    })?;
    Ok(())
}

/// Give a freshly written entry the owner recorded in the archive
///
/// Without the privilege to change ownership the entry keeps the invoking
/// user's ids.
fn apply_ownership(path: &Path, owner: Option<&(u64, u64)>) -> Result<()> {
    let Some(&(uid, gid)) = owner else {
        return Ok(());
    };
    let (Ok(uid), Ok(gid)) = (u32::try_from(uid), u32::try_from(gid)) else {
        warn!("Owner {}:{} of {} is out of range", uid, gid, path.display());
        return Ok(());
    };

    match lchown(path, Some(uid), Some(gid)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Not permitted to chown {} to {}:{}", path.display(), uid, gid);
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Copy every regular file of `source` into `dest` (non-recursive), skipping `exclude`
pub fn copy_flat_dir(source: &Path, dest: &Path, exclude: &[&str]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    let mut copied = Vec::new();
    if !source.is_dir() {
        return Ok(copied);
    }

    let mut entries = fs::read_dir(source)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if exclude.iter().any(|ex| name.as_os_str() == *ex) {
            continue;
        }
        if entry.file_type()?.is_file() {
            let target = dest.join(&name);
            fs::copy(entry.path(), &target)?;
            copied.push(target);
        }
    }
    Ok(copied)
}

/// Replace `path` with `content` via a temporary file in the same directory
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
