// src/hooks.rs

//! Install hooks shipped in a package's `scripts/` section
//!
//! A hook is run as `/bin/sh <script>` with the target root as working
//! directory and `ROOT` in its environment. Its path is passed as a single
//! argument, never interpolated into a shell command line.

use crate::error::{Error, Result};
use crate::layout::Layout;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Runs from the staging area before anything is committed
    PreInstall,
    /// Runs from the record directory once the package is registered
    PostInstall,
}

impl Hook {
    pub fn file_name(&self) -> &'static str {
        match self {
            Hook::PreInstall => "pre-install",
            Hook::PostInstall => "post-install",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Run `hook` from `scripts_dir` if the package ships it
///
/// Returns `Ok(false)` when there is no such script.
pub fn run_hook(layout: &Layout, scripts_dir: &Path, hook: Hook) -> Result<bool> {
    let script = scripts_dir.join(hook.file_name());
    if !script.is_file() {
        debug!("No {} hook in {}", hook, scripts_dir.display());
        return Ok(false);
    }

    info!("Running {} hook {}", hook, script.display());
    let output = Command::new("/bin/sh")
        .arg(&script)
        .current_dir(layout.root())
        .env("ROOT", layout.root())
        .output()
        .map_err(|e| Error::Hook {
            hook: hook.to_string(),
            detail: format!("failed to start {}: {}", script.display(), e),
        })?;

    if !output.stdout.is_empty() {
        debug!("{} stdout: {}", hook, String::from_utf8_lossy(&output.stdout).trim_end());
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Hook {
            hook: hook.to_string(),
            detail: format!("{} ({})", output.status, stderr.trim()),
        });
    }
    Ok(true)
}
