// src/lib.rs

//! Evox Package Manager
//!
//! Minimal package manager for `.evx` archives with dependency-aware
//! install, remove and upgrade.
//!
//! # Architecture
//!
//! - Plain-text state: installed-package database and per-package records
//!   under `<root>/var/evox`, rewritten atomically
//! - Owned-file manifests: every path a package wrote is recorded, and only
//!   those paths are ever removed
//! - Upgrades in place: the old record is set aside, never unregistered, and
//!   recovered if a run is interrupted
//! - Explicit roots: every component works on a `Layout`, so offline images
//!   are handled like the live system (minus install hooks)

pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod hooks;
pub mod installer;
pub mod layout;
pub mod manager;
pub mod packages;
pub mod remover;
pub mod repository;
pub mod resolver;
pub mod ui;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
