// src/packages/manifest.rs

//! Package manifest (`metadata/PKGINFO` + `metadata/PKGDEPS`)

use crate::error::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// Metadata describing a package, as shipped in its archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub source: String,
    /// Rebuild counter of the same version (`pkgrel`)
    pub release: u32,
    pub url: Option<String>,
    pub license: Option<String>,
    pub maintainer: Option<String>,
    /// Runtime dependencies, in declaration order
    pub dependencies: Vec<String>,
}

/// Raw PKGINFO fields before validation
#[derive(Default)]
struct PkgInfo {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    source: Option<String>,
    release: Option<String>,
    url: Option<String>,
    license: Option<String>,
    maintainer: Option<String>,
}

impl PackageManifest {
    /// Parse PKGINFO content (`key = value` lines)
    pub fn parse_pkginfo(content: &str) -> Result<Self> {
        let mut info = PkgInfo::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Manifest(format!("Malformed PKGINFO line: {}", line)));
            };
            let value = value.trim().to_string();

            match key.trim() {
                "name" => info.name = Some(value),
                "version" => info.version = Some(value),
                "description" => info.description = Some(value),
                "source" => info.source = Some(value),
                "pkgrel" => info.release = Some(value),
                "url" => info.url = Some(value),
                "license" => info.license = Some(value),
                "maintainer" => info.maintainer = Some(value),
                other => debug!("Ignoring unknown PKGINFO key: {}", other),
            }
        }

        let release = match info.release {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                Error::Manifest(format!("Package release (pkgrel) is not an integer: {}", raw))
            })?,
            None => 0,
        };

        Ok(Self {
            name: required(info.name, "name")?,
            version: required(info.version, "version")?,
            description: required(info.description, "description")?,
            source: required(info.source, "source")?,
            release,
            url: info.url,
            license: info.license,
            maintainer: info.maintainer,
            dependencies: Vec::new(),
        })
    }

    /// Render back to PKGINFO form
    pub fn to_pkginfo(&self) -> String {
        let mut out = format!(
            "name = {}\nversion = {}\ndescription = {}\nsource = {}\npkgrel = {}\n",
            self.name, self.version, self.description, self.source, self.release
        );
        for (key, value) in [
            ("url", &self.url),
            ("license", &self.license),
            ("maintainer", &self.maintainer),
        ] {
            if let Some(value) = value {
                out.push_str(&format!("{} = {}\n", key, value));
            }
        }
        out
    }

    /// `version-release`, as shown to users
    pub fn full_version(&self) -> String {
        format!("{}-{}", self.version, self.release)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| Error::Manifest(format!("Package {} not found in PKGINFO", field)))
}

/// Parse a dependency list (one package name per line)
pub fn parse_dependency_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Render a dependency list
pub fn render_dependency_list(deps: &[String]) -> String {
    deps.iter().map(|d| format!("{d}\n")).collect()
}
