// src/test_support.rs

//! Fixtures shared by unit tests

use crate::db::LocalStateStore;
use crate::layout::Layout;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

enum Node {
    File(String, Vec<u8>, u32),
    Dir(String),
    Symlink(String, String),
}

/// Builds `<name>-<version>.evx` archives
pub struct ArchiveBuilder {
    name: String,
    version: String,
    release: u32,
    deps: Vec<String>,
    nodes: Vec<Node>,
    scripts: Vec<(String, String)>,
    raw_pkginfo: Option<String>,
}

impl ArchiveBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: 1,
            deps: Vec::new(),
            nodes: Vec::new(),
            scripts: Vec::new(),
            raw_pkginfo: None,
        }
    }

    pub fn release(mut self, release: u32) -> Self {
        self.release = release;
        self
    }

    pub fn depends(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    pub fn file(self, path: &str, content: &str) -> Self {
        self.file_with_mode(path, content, 0o644)
    }

    pub fn file_with_mode(mut self, path: &str, content: &str, mode: u32) -> Self {
        self.nodes
            .push(Node::File(path.to_string(), content.as_bytes().to_vec(), mode));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.nodes.push(Node::Dir(path.to_string()));
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.nodes
            .push(Node::Symlink(path.to_string(), target.to_string()));
        self
    }

    pub fn script(mut self, name: &str, content: &str) -> Self {
        self.scripts.push((name.to_string(), content.to_string()));
        self
    }

    pub fn raw_pkginfo(mut self, content: &str) -> Self {
        self.raw_pkginfo = Some(content.to_string());
        self
    }

    fn pkginfo(&self) -> String {
        self.raw_pkginfo.clone().unwrap_or_else(|| {
            format!(
                "name = {}\nversion = {}\ndescription = Test package {}\nsource = https://example.com/{}\npkgrel = {}\n",
                self.name, self.version, self.name, self.name, self.release
            )
        })
    }

    /// Write the archive into `dir` and return its path
    pub fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}-{}.evx", self.name, self.version));
        let file = File::create(&path).unwrap();
        let encoder = zstd::Encoder::new(file, 0).unwrap();
        let mut tar = Builder::new(encoder);

        let root = &self.name;
        append_dir(&mut tar, &format!("{root}/"));
        append_dir(&mut tar, &format!("{root}/metadata/"));
        append_file(&mut tar, &format!("{root}/metadata/PKGINFO"), self.pkginfo().as_bytes(), 0o644);
        if !self.deps.is_empty() {
            let deps: String = self.deps.iter().map(|d| format!("{d}\n")).collect();
            append_file(&mut tar, &format!("{root}/metadata/PKGDEPS"), deps.as_bytes(), 0o644);
        }

        append_dir(&mut tar, &format!("{root}/data/"));
        for node in &self.nodes {
            match node {
                Node::File(p, content, mode) => {
                    append_parents(&mut tar, root, p);
                    append_file(&mut tar, &format!("{root}/data/{p}"), content, *mode);
                }
                Node::Dir(p) => {
                    append_parents(&mut tar, root, p);
                    append_dir(&mut tar, &format!("{root}/data/{p}/"));
                }
                Node::Symlink(p, target) => {
                    append_parents(&mut tar, root, p);
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    header.set_uid(0);
                    header.set_gid(0);
                    tar.append_link(&mut header, format!("{root}/data/{p}"), target)
                        .unwrap();
                }
            }
        }

        if !self.scripts.is_empty() {
            append_dir(&mut tar, &format!("{root}/scripts/"));
            for (name, content) in &self.scripts {
                append_file(&mut tar, &format!("{root}/scripts/{name}"), content.as_bytes(), 0o755);
            }
        }

        let encoder = tar.into_inner().unwrap();
        encoder.finish().unwrap();
        path
    }
}

fn append_parents(tar: &mut Builder<zstd::Encoder<'static, File>>, root: &str, path: &str) {
    let mut prefix = String::new();
    let parts: Vec<&str> = path.split('/').collect();
    for part in &parts[..parts.len() - 1] {
        prefix.push_str(part);
        prefix.push('/');
        append_dir(tar, &format!("{root}/data/{prefix}"));
    }
}

fn append_dir(tar: &mut Builder<zstd::Encoder<'static, File>>, path: &str) {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_uid(0);
    header.set_gid(0);
    tar.append_data(&mut header, path, std::io::empty()).unwrap();
}

fn append_file(tar: &mut Builder<zstd::Encoder<'static, File>>, path: &str, content: &[u8], mode: u32) {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    tar.append_data(&mut header, path, content).unwrap();
}

/// A scratch root with an initialized state directory
pub struct TestRoot {
    pub dir: TempDir,
    pub layout: Layout,
    pub archives: PathBuf,
}

impl TestRoot {
    pub fn new() -> Self {
        Self::with_live(false)
    }

    /// A scratch root treated as the running system, so hooks run
    pub fn live() -> Self {
        Self::with_live(true)
    }

    fn with_live(live: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let archives = dir.path().join("archives");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&archives).unwrap();

        let layout = Layout::new(&root).with_live(live);
        LocalStateStore::new(layout.clone()).init().unwrap();

        Self {
            dir,
            layout,
            archives,
        }
    }

    pub fn store(&self) -> LocalStateStore {
        LocalStateStore::new(self.layout.clone())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.layout.root().join(relative)
    }
}
