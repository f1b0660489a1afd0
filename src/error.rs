// src/error.rs

use thiserror::Error;

/// Core error types for Evox
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or corrupt package archive
    #[error("Archive error: {0}")]
    Archive(String),

    /// A required manifest field is missing or malformed
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Attempted re-registration of an already-installed package
    #[error("Package {0} is already registered")]
    Duplicate(String),

    /// Attempted removal of a system-critical package
    #[error("Package {0} is protected and cannot be removed")]
    ProtectedPackage(String),

    /// Named dependency absent from all configured repositories
    #[error("Package {0} not found in repositories")]
    DependencyNotFound(String),

    /// A configured repository has never been synced locally
    #[error("Repository {0} doesn't exist (maybe you have not synced it)")]
    RepositoryMissing(String),

    /// A package reappeared on its own dependency path
    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// Operation on a package that is not installed
    #[error("Package {0} is not installed")]
    NotInstalled(String),

    /// Another evox process holds the state lock
    #[error("State directory is locked by another process: {0}")]
    Locked(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failures
    #[error("Download error: {0}")]
    Download(String),

    /// Malformed state or index files
    #[error("Parse error: {0}")]
    Parse(String),

    /// Install hook could not be started or exited unsuccessfully
    #[error("Hook {hook} failed: {detail}")]
    Hook { hook: String, detail: String },
}

/// Result type alias using Evox's Error type
pub type Result<T> = std::result::Result<T, Error>;
