// src/repository/mod.rs

//! Repository access and package downloading
//!
//! This module provides functionality for:
//! - Retrieving files over HTTP(S), from `file://` URLs or local paths
//! - Synchronizing each configured repository's `INDEX`
//! - Looking packages up in the cached indexes (first repository wins)
//! - Downloading package archives into a temporary directory

use crate::config::{Config, RepositoryConfig};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::packages::EvxArchive;
use crate::resolver::PackageSource;
use crate::ui::Ui;
use reqwest::blocking::Client;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Retrieves a URL into a local file
pub trait Transport {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP client wrapper with retry support; local sources are copied
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Download a file to the specified path with retry support
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    write_via_temp(dest_path, |file| {
                        io::copy(&mut response, file).map(|_| ())
                    })?;

                    info!("Successfully downloaded to {}", dest_path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    fn copy_local(&self, source: &Path, dest_path: &Path) -> Result<()> {
        debug!("Copying {} to {}", source.display(), dest_path.display());
        let mut input = File::open(source).map_err(|e| {
            Error::Download(format!("Failed to open {}: {}", source.display(), e))
        })?;
        write_via_temp(dest_path, |file| io::copy(&mut input, file).map(|_| ()))
    }
}

impl Transport for RepositoryClient {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(dest_dir) = dest.parent() {
            fs::create_dir_all(dest_dir)?;
        }

        if let Some(local) = url.strip_prefix("file://") {
            self.copy_local(Path::new(local), dest)
        } else if is_url(url) {
            self.download_file(url, dest)
        } else {
            self.copy_local(Path::new(url), dest)
        }
    }
}

/// Write to a temporary sibling of `dest`, then rename it into place
fn write_via_temp<F>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let temp_path = dest.with_extension("tmp");
    let result = File::create(&temp_path)
        .and_then(|mut file| write(&mut file))
        .and_then(|()| fs::rename(&temp_path, dest));

    result.map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Download(format!("Failed to write {}: {}", dest.display(), e))
    })
}

/// Whether `target` looks like a URL rather than a path or package name
pub fn is_url(target: &str) -> bool {
    match target.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+')
                && !rest.is_empty()
        }
        None => false,
    }
}

fn join_url(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

/// One line of a repository index: `name version release`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub release: u32,
}

impl IndexEntry {
    /// Parse an index line; blank lines and comments yield `None`
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut fields = line.split_whitespace();
        let (Some(name), Some(version)) = (fields.next(), fields.next()) else {
            return Err(Error::Parse(format!("Malformed index line: {}", line)));
        };
        let release = match fields.next() {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| Error::Parse(format!("Invalid release in index line: {}", line)))?,
            None => 0,
        };

        Ok(Some(Self {
            name: name.to_string(),
            version: version.to_string(),
            release,
        }))
    }

    /// `name-version.evx`, the archive's file name in its repository
    pub fn archive_file_name(&self) -> String {
        format!("{}-{}.evx", self.name, self.version)
    }
}

/// The cached index of one repository
#[derive(Debug, Clone, Default)]
pub struct RepositoryIndex {
    pub entries: Vec<IndexEntry>,
}

impl RepositoryIndex {
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for line in content.lines() {
            if let Some(entry) = IndexEntry::parse_line(line)? {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn find(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// A search hit: the repository and its index entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub repository: String,
    pub entry: IndexEntry,
}

/// Configured repositories of one root, with a private download area
pub struct Repositories<'a> {
    layout: &'a Layout,
    config: &'a Config,
    transport: &'a dyn Transport,
    downloads: Option<TempDir>,
}

impl<'a> Repositories<'a> {
    pub fn new(layout: &'a Layout, config: &'a Config, transport: &'a dyn Transport) -> Self {
        Self {
            layout,
            config,
            transport,
            downloads: None,
        }
    }

    /// Fail with `RepositoryMissing` unless every repository has a cached index
    pub fn ensure_synced(&self) -> Result<()> {
        for repo in self.config.repositories() {
            if !self.layout.repo_index_path(&repo.name).is_file() {
                return Err(Error::RepositoryMissing(repo.name.clone()));
            }
        }
        Ok(())
    }

    fn load_index(&self, repo: &RepositoryConfig) -> Result<RepositoryIndex> {
        RepositoryIndex::load(&self.layout.repo_index_path(&repo.name))
    }

    /// Locate `name` in the cached indexes, in configuration order
    pub fn find(&self, name: &str) -> Result<Option<(&'a RepositoryConfig, IndexEntry)>> {
        self.ensure_synced()?;
        let config: &'a Config = self.config;
        for repo in config.repositories() {
            if let Some(entry) = self.load_index(repo)?.find(name) {
                debug!("Found {} {} in repository {}", name, entry.version, repo.name);
                return Ok(Some((repo, entry.clone())));
            }
        }
        Ok(None)
    }

    /// Index entries whose name contains `expr`, across all repositories
    pub fn search(&self, expr: &str) -> Result<Vec<SearchHit>> {
        self.ensure_synced()?;
        let mut hits = Vec::new();
        for repo in self.config.repositories() {
            for entry in self.load_index(repo)?.entries {
                if entry.name.contains(expr) {
                    hits.push(SearchHit {
                        repository: repo.name.clone(),
                        entry,
                    });
                }
            }
        }
        Ok(hits)
    }

    /// Refresh the cached index of every configured repository
    pub fn sync_all(&self, ui: &dyn Ui) -> Result<usize> {
        let mut synced = 0;
        for repo in self.config.repositories() {
            ui.info(&format!("Syncing repository {}...", repo.name));
            fs::create_dir_all(self.layout.repo_dir(&repo.name))?;
            self.transport.fetch(
                &join_url(&repo.url, crate::layout::INDEX_FILE),
                &self.layout.repo_index_path(&repo.name),
            )?;

            let count = self.load_index(repo)?.entries.len();
            info!("Repository {} lists {} packages", repo.name, count);
            ui.success(&format!("Repository {} synced!", repo.name));
            synced += 1;
        }
        Ok(synced)
    }

    /// Retrieve `url` into the download area, keeping its file name
    ///
    /// Downloads live until this value is dropped.
    pub fn download(&mut self, url: &str) -> Result<PathBuf> {
        let file_name = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Download(format!("No file name in {}", url)))?
            .to_string();

        let dest = self.downloads_dir()?.join(file_name);
        self.transport.fetch(url, &dest)?;
        Ok(dest)
    }

    fn downloads_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.downloads {
            return Ok(dir.path().to_path_buf());
        }
        let staging = self.layout.staging_dir();
        fs::create_dir_all(&staging)?;
        let dir = tempfile::Builder::new()
            .prefix("download-")
            .tempdir_in(&staging)?;
        let path = dir.path().to_path_buf();
        self.downloads = Some(dir);
        Ok(path)
    }
}

impl PackageSource for Repositories<'_> {
    fn lookup(&self, name: &str) -> Result<Option<IndexEntry>> {
        Ok(self.find(name)?.map(|(_, entry)| entry))
    }

    fn fetch(&mut self, name: &str) -> Result<EvxArchive> {
        let (repo, entry) = self
            .find(name)?
            .ok_or_else(|| Error::DependencyNotFound(name.to_string()))?;
        let url = join_url(&repo.url, &entry.archive_file_name());
        let path = self.download(&url)?;
        EvxArchive::open(&path, name)
    }
}
