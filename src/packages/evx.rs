// src/packages/evx.rs

//! Evox package archive (`.evx`)
//!
//! An archive is a compressed tarball rooted under a directory named after the
//! package, with three sections:
//!
//! ```text
//! <name>/metadata/PKGINFO
//! <name>/metadata/PKGDEPS   (optional)
//! <name>/data/...           (payload, mirrored under the target root)
//! <name>/scripts/...        (optional install hooks)
//! ```

use crate::error::{Error, Result};
use crate::layout::{PKGDEPS_FILE, PKGINFO_FILE};
use crate::packages::manifest::{PackageManifest, parse_dependency_list};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::debug;
use xz2::read::XzDecoder;

/// Package compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionFormat {
    Zstd,
    Xz,
    Gzip,
}

/// Owner and group recorded in the archive, keyed by payload path
pub type Ownership = HashMap<PathBuf, (u64, u64)>;

/// An opened package archive; only its metadata section has been read
#[derive(Debug)]
pub struct EvxArchive {
    path: PathBuf,
    manifest: PackageManifest,
}

impl EvxArchive {
    /// Read the manifest of the archive at `path`, rooted under `declared_name`
    pub fn open(path: impl AsRef<Path>, declared_name: &str) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading evx archive: {} ({})", path.display(), declared_name);

        let pkginfo_path = Path::new(declared_name).join("metadata").join(PKGINFO_FILE);
        let pkgdeps_path = Path::new(declared_name).join("metadata").join(PKGDEPS_FILE);

        let mut archive = Self::open_archive(path)?;
        let mut pkginfo = None;
        let mut pkgdeps = None;

        for entry in archive
            .entries()
            .map_err(|e| Error::Archive(format!("Failed to read archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::Archive(format!("Failed to read entry: {}", e)))?;
            let entry_path = normalize_entry_path(
                &entry
                    .path()
                    .map_err(|e| Error::Archive(format!("Failed to get entry path: {}", e)))?,
            )?;

            let slot = if entry_path == pkginfo_path {
                &mut pkginfo
            } else if entry_path == pkgdeps_path {
                &mut pkgdeps
            } else {
                continue;
            };

            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| {
                Error::Archive(format!("Failed to read {}: {}", entry_path.display(), e))
            })?;
            *slot = Some(content);

            if pkginfo.is_some() && pkgdeps.is_some() {
                break;
            }
        }

        let pkginfo = pkginfo.ok_or_else(|| {
            Error::Archive(format!("No {} found in package", pkginfo_path.display()))
        })?;

        let mut manifest = PackageManifest::parse_pkginfo(&pkginfo)?;
        if manifest.name != declared_name {
            return Err(Error::Manifest(format!(
                "Archive is rooted at {} but PKGINFO declares {}",
                declared_name, manifest.name
            )));
        }
        if let Some(deps) = pkgdeps {
            manifest.dependencies = parse_dependency_list(&deps);
        }

        debug!(
            "Parsed evx package: {} version {} ({} dependencies)",
            manifest.name,
            manifest.full_version(),
            manifest.dependencies.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
        })
    }

    /// Open an archive whose package name is derived from its file name
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let name = name_from_archive_path(path.as_ref())?;
        Self::open(path, &name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Detect compression format from magic bytes
    fn detect_compression(path: &Path) -> Result<CompressionFormat> {
        let mut file = File::open(path)
            .map_err(|e| Error::Archive(format!("Failed to open {}: {}", path.display(), e)))?;
        let mut magic = [0u8; 6];
        file.read_exact(&mut magic).map_err(|_| {
            Error::Archive(format!("{} is too short to be a package", path.display()))
        })?;

        if magic[0..4] == [0x28, 0xB5, 0x2F, 0xFD] {
            Ok(CompressionFormat::Zstd)
        } else if magic == [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00] {
            Ok(CompressionFormat::Xz)
        } else if magic[0..2] == [0x1F, 0x8B] {
            Ok(CompressionFormat::Gzip)
        } else {
            Err(Error::Archive(format!(
                "Unable to detect package compression for: {}",
                path.display()
            )))
        }
    }

    /// Open and decompress the package archive as a stream
    fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
        let compression = Self::detect_compression(path)?;
        let file = File::open(path)
            .map_err(|e| Error::Archive(format!("Failed to open package file: {}", e)))?;

        let reader: Box<dyn Read> = match compression {
            CompressionFormat::Zstd => {
                let decoder = zstd::Decoder::new(file)
                    .map_err(|e| Error::Archive(format!("Failed to create zstd decoder: {}", e)))?;
                Box::new(decoder)
            }
            CompressionFormat::Xz => Box::new(XzDecoder::new(file)),
            CompressionFormat::Gzip => Box::new(GzDecoder::new(file)),
        };

        Ok(Archive::new(reader))
    }

    /// Unpack the whole archive into a fresh staging directory under `staging_root`
    pub fn unpack(&self, staging_root: &Path) -> Result<StagedPackage> {
        std::fs::create_dir_all(staging_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", self.name()))
            .tempdir_in(staging_root)?;
        debug!("Staging {} in {}", self.name(), dir.path().display());

        let data_prefix = Path::new(self.name()).join("data");
        let mut ownership = Ownership::new();

        let mut archive = Self::open_archive(&self.path)?;
        archive.set_preserve_permissions(true);

        for entry in archive
            .entries()
            .map_err(|e| Error::Archive(format!("Failed to read archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::Archive(format!("Failed to read entry: {}", e)))?;
            let entry_path = normalize_entry_path(
                &entry
                    .path()
                    .map_err(|e| Error::Archive(format!("Failed to get entry path: {}", e)))?,
            )?;

            if entry_path.as_os_str().is_empty() {
                continue;
            }
            if !entry_path.starts_with(self.name()) {
                return Err(Error::Archive(format!(
                    "Entry {} is outside the package directory {}",
                    entry_path.display(),
                    self.name()
                )));
            }

            if let Ok(relative) = entry_path.strip_prefix(&data_prefix) {
                if !relative.as_os_str().is_empty() {
                    let header = entry.header();
                    if let (Ok(uid), Ok(gid)) = (header.uid(), header.gid()) {
                        ownership.insert(relative.to_path_buf(), (uid, gid));
                    }
                }
            }

            let unpacked = entry.unpack_in(dir.path()).map_err(|e| {
                Error::Archive(format!("Failed to unpack {}: {}", entry_path.display(), e))
            })?;
            if !unpacked {
                return Err(Error::Archive(format!(
                    "Refusing to unpack {}",
                    entry_path.display()
                )));
            }
        }

        let package_root = dir.path().join(self.name());
        if !package_root.join("metadata").is_dir() {
            return Err(Error::Archive(format!(
                "Package {} has no metadata section",
                self.name()
            )));
        }

        Ok(StagedPackage {
            dir,
            name: self.name().to_string(),
            ownership,
        })
    }
}

/// An archive unpacked into a private staging directory, removed on drop
#[derive(Debug)]
pub struct StagedPackage {
    dir: TempDir,
    name: String,
    ownership: Ownership,
}

impl StagedPackage {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn package_root(&self) -> PathBuf {
        self.dir.path().join(&self.name)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.package_root().join("metadata")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.package_root().join("data")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.package_root().join("scripts")
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    /// Holds the previous content of files a commit overwrites
    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join(".replaced")
    }
}

/// Strip `./` components and reject paths that could escape the staging area
fn normalize_entry_path(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Archive(format!(
                    "Unsafe path in archive: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(normalized)
}

/// Derive the package name from an archive file name (`foo-bar-1.0.evx` -> `foo-bar`)
pub fn name_from_archive_path(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Archive(format!("Invalid archive path: {}", path.display())))?;
    let stem = file_name.strip_suffix(".evx").unwrap_or(file_name);

    match stem.rsplit_once('-') {
        Some((name, _version)) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(Error::Archive(format!(
            "Archive name {} does not follow <name>-<version>.evx",
            file_name
        ))),
    }
}
