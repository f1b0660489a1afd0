// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .env("ROOT")
        .default_value("/")
        .global(true)
        .help("Root directory to operate on")
}

fn build_cli() -> Command {
    Command::new("evox")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Evox Contributors")
        .about("Minimal package manager for .evx archives")
        .subcommand_required(false)
        .arg(root_arg())
        .subcommand(
            Command::new("get")
                .about("Install packages from a repository, a local .evx file or a URL")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names, archive paths or URLs"),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Do not ask for confirmation; skip packages already installed"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages and the dependencies nothing else needs")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                )
                .arg(
                    Arg::new("no_deps")
                        .long("no-deps")
                        .action(ArgAction::SetTrue)
                        .help("Keep the dependencies of the removed packages"),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade every installed package to the version its repository offers"),
        )
        .subcommand(
            Command::new("info")
                .about("Show the stored details of an installed package")
                .arg(Arg::new("package").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("search")
                .about("Search the synced repository indexes")
                .arg(Arg::new("expr").required(true).help("Substring of the package name")),
        )
        .subcommand(Command::new("sync").about("Download the index of every configured repository"))
        .subcommand(Command::new("init").about("Create the evox state directory in the root"))
        .subcommand(
            Command::new("tree")
                .about("Show the dependency tree of an installed package")
                .arg(Arg::new("package").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("list").about("List installed packages").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Print JSON instead of plain lines"),
            ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("evox.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
