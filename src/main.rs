// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use evox::layout::Layout;
use evox::manager::PackageManager;
use evox::repository::RepositoryClient;
use evox::ui::{ConsoleUi, Ui};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "evox")]
#[command(author, version, about = "Minimal package manager for .evx archives", long_about = None)]
struct Cli {
    /// Root directory to operate on
    #[arg(short, long, env = "ROOT", default_value = "/", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages from a repository, a local .evx file or a URL
    Get {
        /// Package names, archive paths or URLs
        #[arg(required = true)]
        packages: Vec<String>,
        /// Do not ask for confirmation; skip packages already installed
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Remove installed packages and the dependencies nothing else needs
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Keep the dependencies of the removed packages
        #[arg(long)]
        no_deps: bool,
    },
    /// Upgrade every installed package to the version its repository offers
    Upgrade,
    /// Show the stored details of an installed package
    Info {
        /// Package name
        package: String,
    },
    /// Search the synced repository indexes
    Search {
        /// Substring of the package name
        expr: String,
    },
    /// Download the index of every configured repository
    Sync,
    /// Create the evox state directory in the root
    Init,
    /// Show the dependency tree of an installed package
    Tree {
        /// Package name
        package: String,
    },
    /// List installed packages
    List {
        /// Print JSON instead of plain lines
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let assume_yes = matches!(&cli.command, Some(Commands::Get { yes: true, .. }));
    let ui = ConsoleUi::new(assume_yes);

    if let Err(e) = run(cli, &ui) {
        ui.error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli, ui: &dyn Ui) -> Result<()> {
    debug!("Operating on root {}", cli.root.display());
    let layout = Layout::new(cli.root);

    let Some(command) = cli.command else {
        println!("Evox Package Manager v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'evox --help' for usage information");
        return Ok(());
    };

    let client = RepositoryClient::new()?;
    let manager = PackageManager::new(layout, ui, &client);

    match command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "evox", &mut std::io::stdout());
        }
        Commands::Get { packages, yes } => manager.get(&packages, yes)?,
        Commands::Remove { packages, no_deps } => manager.remove(&packages, !no_deps)?,
        Commands::Upgrade => {
            let upgraded = manager.upgrade_all()?;
            if upgraded > 0 {
                ui.success(&format!("{} package(s) upgraded", upgraded));
            }
        }
        Commands::Info { package } => {
            let info = manager.info(&package)?;
            let manifest = &info.manifest;
            println!("Name: {}", manifest.name);
            println!("Version: {}", manifest.full_version());
            println!("Description: {}", manifest.description);
            println!("Source: {}", manifest.source);
            if let Some(url) = &manifest.url {
                println!("URL: {}", url);
            }
            if let Some(license) = &manifest.license {
                println!("License: {}", license);
            }
            if let Some(maintainer) = &manifest.maintainer {
                println!("Maintainer: {}", maintainer);
            }
            if manifest.dependencies.is_empty() {
                println!("Dependencies: none");
            } else {
                println!("Dependencies: {}", manifest.dependencies.join(", "));
            }
            println!("Installed: {}", info.install_date);
        }
        Commands::Search { expr } => {
            let results = manager.search(&expr)?;
            if results.is_empty() {
                println!("No packages found.");
            }
            for (hit, installed) in results {
                let marker = installed
                    .map(|v| format!(" [installed: {}]", v))
                    .unwrap_or_default();
                println!(
                    "{}/{} {}-{}{}",
                    hit.repository, hit.entry.name, hit.entry.version, hit.entry.release, marker
                );
            }
        }
        Commands::Sync => {
            manager.sync()?;
        }
        Commands::Init => manager.init()?,
        Commands::Tree { package } => print!("{}", manager.tree(&package)?),
        Commands::List { json } => {
            let records = manager.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No packages installed.");
            } else {
                for record in &records {
                    println!("{} {} ({})", record.name, record.version, record.install_date);
                }
                println!("\nTotal: {} package(s)", records.len());
            }
        }
    }

    Ok(())
}
