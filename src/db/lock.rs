// src/db/lock.rs

//! Process-scoped exclusive lock on the state directory
//!
//! The lock file holds the owner's pid. A lock left by a process that no
//! longer exists is taken over; an interrupt (SIGINT/SIGTERM) releases every
//! lock this process holds before exiting.

use crate::error::{Error, Result};
use crate::layout::Layout;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tracing::{debug, warn};

/// Exit status after an interrupt, as a shell reports SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

static HELD_LOCKS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
static INTERRUPT_HANDLER: Once = Once::new();

/// Held for the duration of a mutating command; released on drop
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    pub fn acquire(layout: &Layout) -> Result<Self> {
        let path = layout.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match create_lock_file(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_holder(&path);
                match holder {
                    Some(pid) if !is_running(pid) => {
                        warn!("Removing stale lock {} left by pid {}", path.display(), pid);
                        fs::remove_file(&path)?;
                        create_lock_file(&path).map_err(|e| lock_error(&path, e))?
                    }
                    Some(pid) => {
                        return Err(Error::Locked(format!("{} (pid {})", path.display(), pid)));
                    }
                    None => return Err(Error::Locked(path.display().to_string())),
                }
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            let _ = fs::remove_file(&path);
            return Err(Error::Io(e));
        }

        install_interrupt_handler();
        if let Ok(mut held) = HELD_LOCKS.lock() {
            held.push(path.clone());
        }
        debug!("Acquired state lock {}", path.display());
        Ok(Self { path })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Ok(mut held) = HELD_LOCKS.lock() {
            held.retain(|p| *p != self.path);
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release state lock {}: {}", self.path.display(), e);
        }
    }
}

fn create_lock_file(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}

fn lock_error(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::AlreadyExists {
        Error::Locked(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

fn read_holder(path: &Path) -> Option<i32> {
    fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
}

/// Whether a process with `pid` exists; EPERM still means it does
fn is_running(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

fn install_interrupt_handler() {
    INTERRUPT_HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            release_held_locks();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        });
        if let Err(e) = installed {
            warn!("Failed to install interrupt handler: {}", e);
        }
    });
}

fn release_held_locks() {
    let held = HELD_LOCKS
        .lock()
        .map(|mut held| std::mem::take(&mut *held))
        .unwrap_or_default();
    for path in held {
        let _ = fs::remove_file(path);
    }
}
