// src/config.rs

//! Configuration file handling
//!
//! `etc/evox.conf` lists repositories, one per line:
//!
//! ```text
//! # comment
//! REPO core https://repo.example.org/core
//! ```

use crate::error::{Error, Result};
use crate::layout::Layout;
use std::fs;
use tracing::debug;

/// A configured repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
}

/// Parsed evox configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    repositories: Vec<RepositoryConfig>,
}

impl Config {
    /// Read the configuration file of the given root
    pub fn load(layout: &Layout) -> Result<Self> {
        let path = layout.config_path();
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Like `load`, but a root without a configuration file has no repositories
    pub fn load_or_default(layout: &Layout) -> Result<Self> {
        if !layout.config_path().exists() {
            debug!("No configuration at {}", layout.config_path().display());
            return Ok(Self::default());
        }
        Self::load(layout)
    }

    /// Parse configuration file content
    pub fn parse(content: &str) -> Result<Self> {
        let mut repositories: Vec<RepositoryConfig> = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("REPO") => {
                    let (Some(name), Some(url)) = (fields.next(), fields.next()) else {
                        return Err(Error::Config(format!(
                            "line {}: expected `REPO <name> <url>`",
                            lineno + 1
                        )));
                    };

                    // A later entry for the same name overrides the URL
                    if let Some(existing) = repositories.iter_mut().find(|r| r.name == name) {
                        existing.url = url.to_string();
                    } else {
                        repositories.push(RepositoryConfig {
                            name: name.to_string(),
                            url: url.to_string(),
                        });
                    }
                }
                Some(other) => debug!("Ignoring unknown configuration key: {}", other),
                None => {}
            }
        }

        Ok(Self { repositories })
    }

    /// Repositories in configuration order
    pub fn repositories(&self) -> &[RepositoryConfig] {
        &self.repositories
    }

    pub fn with_repository(mut self, name: &str, url: &str) -> Self {
        self.repositories.push(RepositoryConfig {
            name: name.to_string(),
            url: url.to_string(),
        });
        self
    }
}
