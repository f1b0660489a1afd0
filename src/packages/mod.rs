// src/packages/mod.rs

//! Package archive support for Evox
//!
//! Reads `.evx` archives: the manifest without touching installed state, and
//! the full payload into a staging directory for the installer.

pub mod evx;
pub mod manifest;

pub use evx::{EvxArchive, StagedPackage, name_from_archive_path};
pub use manifest::PackageManifest;
