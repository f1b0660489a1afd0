// tests/integration_test.rs

//! Integration tests for Evox
//!
//! These tests drive `PackageManager` end to end against a scratch root and a
//! repository laid out in a local directory.

use evox::Error;
use evox::db::{LocalStateStore, StateLock};
use evox::layout::Layout;
use evox::manager::PackageManager;
use evox::repository::RepositoryClient;
use evox::ui::MemoryUi;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

/// Package archive description for fixtures
struct Pkg {
    name: &'static str,
    version: &'static str,
    release: u32,
    deps: Vec<&'static str>,
    files: Vec<(&'static str, &'static str)>,
}

impl Pkg {
    fn new(name: &'static str, version: &'static str) -> Self {
        Self {
            name,
            version,
            release: 1,
            deps: Vec::new(),
            files: Vec::new(),
        }
    }

    fn release(mut self, release: u32) -> Self {
        self.release = release;
        self
    }

    fn depends(mut self, dep: &'static str) -> Self {
        self.deps.push(dep);
        self
    }

    fn file(mut self, path: &'static str, content: &'static str) -> Self {
        self.files.push((path, content));
        self
    }

    fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}-{}.evx", self.name, self.version));
        let encoder = zstd::Encoder::new(File::create(&path).unwrap(), 0).unwrap();
        let mut tar = Builder::new(encoder);

        let pkginfo = format!(
            "name = {}\nversion = {}\ndescription = {} test package\nsource = https://example.com/{}\npkgrel = {}\nlicense = MIT\n",
            self.name, self.version, self.name, self.name, self.release
        );
        append(&mut tar, &format!("{}/metadata/PKGINFO", self.name), pkginfo.as_bytes());
        if !self.deps.is_empty() {
            let deps: String = self.deps.iter().map(|d| format!("{d}\n")).collect();
            append(&mut tar, &format!("{}/metadata/PKGDEPS", self.name), deps.as_bytes());
        }

        let mut dirs = Vec::new();
        for (file, _) in &self.files {
            let mut prefix = String::new();
            let parts: Vec<&str> = file.split('/').collect();
            for part in &parts[..parts.len() - 1] {
                prefix.push_str(part);
                prefix.push('/');
                if !dirs.contains(&prefix) {
                    dirs.push(prefix.clone());
                }
            }
        }
        for dir in &dirs {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            tar.append_data(&mut header, format!("{}/data/{}", self.name, dir), std::io::empty())
                .unwrap();
        }
        for (file, content) in &self.files {
            append(&mut tar, &format!("{}/data/{}", self.name, file), content.as_bytes());
        }

        tar.into_inner().unwrap().finish().unwrap();
        path
    }
}

fn append(tar: &mut Builder<zstd::Encoder<'static, File>>, path: &str, content: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    tar.append_data(&mut header, path, content).unwrap();
}

/// A scratch root configured with one local repository
struct Fixture {
    dir: TempDir,
    layout: Layout,
    client: RepositoryClient,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let repo = dir.path().join("repo");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::create_dir_all(&repo).unwrap();
        fs::write(
            root.join("etc/evox.conf"),
            format!("# test configuration\nREPO core {}\n", repo.display()),
        )
        .unwrap();

        let fixture = Self {
            dir,
            layout: Layout::new(&root),
            client: RepositoryClient::new().unwrap(),
        };
        fixture.manager(&MemoryUi::new(true)).init().unwrap();
        fixture
    }

    fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    fn manager<'a>(&'a self, ui: &'a MemoryUi) -> PackageManager<'a> {
        PackageManager::new(self.layout.clone(), ui, &self.client)
    }

    /// Publish packages and rewrite the repository index
    fn publish(&self, packages: &[Pkg]) {
        let index_path = self.repo().join("INDEX");
        let mut index = fs::read_to_string(&index_path).unwrap_or_default();
        for pkg in packages {
            pkg.write(&self.repo());
            index = index
                .lines()
                .filter(|line| line.split_whitespace().next() != Some(pkg.name))
                .map(|line| format!("{line}\n"))
                .collect();
            index.push_str(&format!("{} {} {}\n", pkg.name, pkg.version, pkg.release));
        }
        fs::write(index_path, index).unwrap();
        self.manager(&MemoryUi::new(true)).sync().unwrap();
    }

    fn store(&self) -> LocalStateStore {
        LocalStateStore::new(self.layout.clone())
    }

    fn installed(&self) -> Vec<String> {
        self.store()
            .list_installed()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.layout.root().join(relative)
    }
}

fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_get_installs_dependency_first() {
    let fx = Fixture::new();
    fx.publish(&[
        Pkg::new("bar", "1.0").file("usr/lib/libbar.so", "bar"),
        Pkg::new("foo", "1.0").depends("bar").file("usr/bin/foo", "foo"),
    ]);

    let ui = MemoryUi::new(true);
    fx.manager(&ui).get(&targets(&["foo"]), true).unwrap();

    assert_eq!(fx.installed(), vec!["bar", "foo"]);
    let store = fx.store();
    assert!(store.is_installed("foo").unwrap());
    assert!(store.is_installed("bar").unwrap());
    assert!(fx.path("usr/lib/libbar.so").exists());
    assert!(fx.path("usr/bin/foo").exists());
    assert!(ui.contains("Package installed successfully!"));

    // downloads are gone once the command is over
    assert_eq!(fs::read_dir(fx.layout.staging_dir()).unwrap().count(), 0);
}

#[test]
fn test_get_local_archive_file() {
    let fx = Fixture::new();
    let archives = fx.dir.path().join("local");
    fs::create_dir_all(&archives).unwrap();
    let path = Pkg::new("hello-world", "0.3").file("usr/bin/hello", "hi").write(&archives);

    let ui = MemoryUi::new(true);
    fx.manager(&ui)
        .get(&[path.display().to_string()], true)
        .unwrap();

    assert_eq!(fx.installed(), vec!["hello-world"]);
    assert!(ui.contains("Package name: hello-world"));
    assert!(ui.contains("Package license: MIT"));
}

#[test]
fn test_declined_confirmation_installs_nothing() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("foo", "1.0").file("usr/bin/foo", "foo")]);

    let ui = MemoryUi::new(false);
    fx.manager(&ui).get(&targets(&["foo"]), false).unwrap();

    assert!(fx.installed().is_empty());
    assert!(!fx.path("usr/bin/foo").exists());
}

#[test]
fn test_get_already_installed_with_yes_is_skipped() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("foo", "1.0").file("usr/bin/foo", "foo")]);
    fx.manager(&MemoryUi::new(true)).get(&targets(&["foo"]), true).unwrap();
    let db = fs::read_to_string(fx.layout.db_path()).unwrap();

    let ui = MemoryUi::new(true);
    fx.manager(&ui).get(&targets(&["foo"]), true).unwrap();

    assert_eq!(fs::read_to_string(fx.layout.db_path()).unwrap(), db);
    assert!(ui.contains("already installed"));
}

#[test]
fn test_reinstall_when_confirmed() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("foo", "1.0").file("usr/bin/foo", "foo")]);
    fx.manager(&MemoryUi::new(true)).get(&targets(&["foo"]), true).unwrap();
    fs::remove_file(fx.path("usr/bin/foo")).unwrap();

    let ui = MemoryUi::new(true);
    fx.manager(&ui).get(&targets(&["foo"]), false).unwrap();

    assert!(ui.contains("This package is already installed."));
    assert!(fx.path("usr/bin/foo").exists());
    assert_eq!(fx.installed(), vec!["foo"]);
}

#[test]
fn test_unknown_dependency_aborts_everything() {
    let fx = Fixture::new();
    fx.publish(&[
        Pkg::new("bar", "1.0").depends("ghost"),
        Pkg::new("foo", "1.0").depends("bar").file("usr/bin/foo", "foo"),
    ]);

    let err = fx
        .manager(&MemoryUi::new(true))
        .get(&targets(&["foo"]), true)
        .unwrap_err();
    assert!(matches!(err, Error::DependencyNotFound(name) if name == "ghost"));
    assert!(fx.installed().is_empty());
    assert!(!fx.path("usr/bin/foo").exists());
}

#[test]
fn test_unsynced_repository_is_reported() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("foo", "1.0")]);
    fs::write(
        fx.layout.config_path(),
        format!("REPO core {}\nREPO extra /nowhere\n", fx.repo().display()),
    )
    .unwrap();

    let err = fx
        .manager(&MemoryUi::new(true))
        .get(&targets(&["foo"]), true)
        .unwrap_err();
    assert!(matches!(err, Error::RepositoryMissing(name) if name == "extra"));
}

#[test]
fn test_remove_keeps_dependency_needed_elsewhere() {
    let fx = Fixture::new();
    fx.publish(&[
        Pkg::new("bar", "1.0").file("usr/lib/libbar.so", "bar"),
        Pkg::new("foo", "1.0").depends("bar").file("usr/bin/foo", "foo"),
        Pkg::new("baz", "1.0").depends("bar").file("usr/bin/baz", "baz"),
    ]);
    fx.manager(&MemoryUi::new(true))
        .get(&targets(&["foo", "baz"]), true)
        .unwrap();

    let ui = MemoryUi::new(true);
    fx.manager(&ui).remove(&targets(&["foo"]), true).unwrap();

    assert_eq!(fx.installed(), vec!["bar", "baz"]);
    assert!(!fx.path("usr/bin/foo").exists());
    assert!(fx.path("usr/lib/libbar.so").exists());
    assert!(fx.path("usr/bin/baz").exists());
    assert!(ui.contains("Package bar is a dependency of another package, not removing it"));

    // once nothing needs it, bar goes with baz
    fx.manager(&ui).remove(&targets(&["baz"]), true).unwrap();
    assert!(fx.installed().is_empty());
    assert!(!fx.path("usr").exists());
}

#[test]
fn test_remove_protected_package() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("coreutils", "9.4").file("bin/ls", "ls")]);
    fx.manager(&MemoryUi::new(true))
        .get(&targets(&["coreutils"]), true)
        .unwrap();

    let err = fx
        .manager(&MemoryUi::new(true))
        .remove(&targets(&["coreutils"]), true)
        .unwrap_err();
    assert!(matches!(err, Error::ProtectedPackage(_)));
    assert_eq!(fx.installed(), vec!["coreutils"]);
    assert!(fx.path("bin/ls").exists());
}

#[test]
fn test_upgrade_release_bump_reconciles_files() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("foo", "1.0")
        .release(1)
        .file("usr/bin/foo", "v1")
        .file("usr/share/foo/legacy.txt", "legacy")]);
    fx.manager(&MemoryUi::new(true)).get(&targets(&["foo"]), true).unwrap();

    fx.publish(&[Pkg::new("foo", "1.0")
        .release(2)
        .file("usr/bin/foo", "v2")
        .file("usr/share/foo/fresh.txt", "fresh")]);

    let ui = MemoryUi::new(true);
    assert_eq!(fx.manager(&ui).upgrade_all().unwrap(), 1);

    assert_eq!(fs::read_to_string(fx.path("usr/bin/foo")).unwrap(), "v2");
    assert!(fx.path("usr/share/foo/fresh.txt").exists());
    assert!(!fx.path("usr/share/foo/legacy.txt").exists());

    let store = fx.store();
    let owned = store.owned_files("foo").unwrap();
    assert!(owned.contains(Path::new("usr/share/foo/fresh.txt")));
    assert!(!owned.contains(Path::new("usr/share/foo/legacy.txt")));
    assert_eq!(store.release("foo").unwrap(), 2);
    assert!(ui.contains("The package foo is being upgraded from version 1.0-1 to version 1.0-2."));
}

#[test]
fn test_upgrade_is_idempotent() {
    let fx = Fixture::new();
    fx.publish(&[Pkg::new("foo", "1.0").file("usr/bin/foo", "v1")]);
    fx.manager(&MemoryUi::new(true)).get(&targets(&["foo"]), true).unwrap();
    fx.publish(&[Pkg::new("foo", "1.1").file("usr/bin/foo", "v1.1")]);

    assert_eq!(fx.manager(&MemoryUi::new(true)).upgrade_all().unwrap(), 1);
    let db = fs::read_to_string(fx.layout.db_path()).unwrap();
    let tree = fs::read_to_string(fx.layout.package_dir("foo").join("PKGTREE")).unwrap();

    let ui = MemoryUi::new(true);
    assert_eq!(fx.manager(&ui).upgrade_all().unwrap(), 0);
    assert_eq!(fs::read_to_string(fx.layout.db_path()).unwrap(), db);
    assert_eq!(
        fs::read_to_string(fx.layout.package_dir("foo").join("PKGTREE")).unwrap(),
        tree
    );
    assert!(!ui.contains("is being upgraded"));
}

#[test]
fn test_mutating_commands_respect_lock() {
    let fx = Fixture::new();
    let _held = StateLock::acquire(&fx.layout).unwrap();

    let err = fx
        .manager(&MemoryUi::new(true))
        .remove(&targets(&["foo"]), true)
        .unwrap_err();
    assert!(matches!(err, Error::Locked(_)));

    // read-only commands do not need the lock
    assert!(fx.manager(&MemoryUi::new(true)).list().unwrap().is_empty());
}

#[test]
fn test_info_search_and_tree() {
    let fx = Fixture::new();
    fx.publish(&[
        Pkg::new("libfoo", "2.1").release(3),
        Pkg::new("foo", "1.0").depends("libfoo"),
        Pkg::new("foobar", "0.1"),
    ]);
    let ui = MemoryUi::new(true);
    let manager = fx.manager(&ui);
    manager.get(&targets(&["foo"]), true).unwrap();

    let info = manager.info("libfoo").unwrap();
    assert_eq!(info.manifest.full_version(), "2.1-3");
    assert_eq!(manager.info("foo").unwrap().manifest.dependencies, vec!["libfoo"]);
    assert!(matches!(manager.info("foobar"), Err(Error::NotInstalled(_))));

    let results = manager.search("foo").unwrap();
    let summary: Vec<(String, Option<String>)> = results
        .into_iter()
        .map(|(hit, installed)| (hit.entry.name, installed))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("libfoo".to_string(), Some("2.1-3".to_string())),
            ("foo".to_string(), Some("1.0-1".to_string())),
            ("foobar".to_string(), None),
        ]
    );

    assert_eq!(manager.tree("foo").unwrap().to_string(), "foo 1.0\n`-- libfoo 2.1\n");
}

#[test]
fn test_init_clears_staging_leftovers() {
    let fx = Fixture::new();
    let leftover = fx.layout.staging_dir().join("foo-abc123");
    fs::create_dir_all(leftover.join("foo/data")).unwrap();

    fx.manager(&MemoryUi::new(true)).init().unwrap();

    assert!(!leftover.exists());
    assert!(fx.layout.staging_dir().is_dir());
    assert!(fx.layout.db_path().is_file());
    assert!(fx.layout.repo_dir("core").is_dir());
}

#[test]
fn test_cli_generates_completions() {
    let dir = tempfile::tempdir().unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_evox"))
        .args(["--root", &dir.path().display().to_string(), "completions", "bash"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let script = String::from_utf8_lossy(&output.stdout);
    assert!(script.contains("_evox"));
    assert!(script.contains("remove"));
}

#[test]
fn test_cli_reports_errors_with_status_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_evox"))
        .args(["--root", &dir.path().display().to_string(), "info", "ghost"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}
