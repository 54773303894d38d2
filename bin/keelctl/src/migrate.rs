//! ---
//! keel_section: "06-operator-interfaces"
//! keel_subsection: "binary"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Control CLI for operators inspecting Keel stores."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use keel_common::Topic;
use keel_persistence::{
    migrate_lifecycle, migrate_versions, JsonFileLifecycleStore, JsonFileVersionStore,
};

/// `keelctl migrate` subcommands.
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Copy installed versions.
    Versions(MigrateArgs),
    /// Copy setup/cleanup flags.
    Lifecycle(MigrateArgs),
}

/// Source, destination, and topic filter for a migration.
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Store file to read from.
    #[arg(long, value_name = "FILE")]
    pub from: PathBuf,
    /// Store file to write to.
    #[arg(long, value_name = "FILE")]
    pub to: PathBuf,
    /// Restrict the copy to these topics (repeatable); every recorded topic otherwise.
    #[arg(long = "topic", value_name = "TOPIC")]
    pub topics: Vec<String>,
}

impl MigrateArgs {
    fn topics(&self) -> Option<Vec<Topic>> {
        if self.topics.is_empty() {
            None
        } else {
            Some(self.topics.iter().map(|t| Topic::new(t.as_str())).collect())
        }
    }
}

/// Execute a migration between two store files.
pub fn run(command: MigrateCommand) -> Result<()> {
    let copied = match &command {
        MigrateCommand::Versions(args) => {
            let topics = args.topics();
            migrate_versions(
                &JsonFileVersionStore::new(&args.from),
                &JsonFileVersionStore::new(&args.to),
                topics.as_deref(),
            )
            .with_context(|| {
                format!("migrating versions {} -> {}", args.from.display(), args.to.display())
            })?
        }
        MigrateCommand::Lifecycle(args) => {
            let topics = args.topics();
            migrate_lifecycle(
                &JsonFileLifecycleStore::new(&args.from),
                &JsonFileLifecycleStore::new(&args.to),
                topics.as_deref(),
            )
            .with_context(|| {
                format!("migrating lifecycle {} -> {}", args.from.display(), args.to.display())
            })?
        }
    };
    for topic in &copied {
        println!("{topic}");
    }
    println!("copied {} record(s)", copied.len());
    Ok(())
}
