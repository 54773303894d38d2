//! ---
//! keel_section: "06-operator-interfaces"
//! keel_subsection: "binary"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Control CLI for operators inspecting Keel stores."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use keel_common::logging;
use keel_common::KeelConfig;

mod compare;
mod lifecycle;
mod migrate;
mod versions;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Keel version and lifecycle store utility",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to KEEL_CONFIG, then ./keel.toml, then /etc/keel/keel.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compare two version strings.
    Compare(compare::CompareArgs),
    #[command(subcommand, about = "Installed version records")]
    Versions(versions::VersionsCommand),
    #[command(subcommand, about = "Persisted setup/cleanup records")]
    Lifecycle(lifecycle::LifecycleCommand),
    #[command(subcommand, about = "Copy recorded state between store files")]
    Migrate(migrate::MigrateCommand),
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Compare(args) => compare::run(args)?,
        Commands::Versions(cmd) => versions::run(cmd, &load_config(cli.config.as_deref())?)?,
        Commands::Lifecycle(cmd) => lifecycle::run(cmd, &load_config(cli.config.as_deref())?)?,
        Commands::Migrate(cmd) => migrate::run(cmd)?,
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<KeelConfig> {
    if let Some(path) = explicit {
        return KeelConfig::load(&[path]);
    }
    KeelConfig::load_or_default(&[
        PathBuf::from("keel.toml"),
        PathBuf::from("/etc/keel/keel.toml"),
    ])
}
