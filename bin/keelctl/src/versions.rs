//! ---
//! keel_section: "06-operator-interfaces"
//! keel_subsection: "binary"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Control CLI for operators inspecting Keel stores."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use keel_common::{KeelConfig, Topic, Version};
use keel_persistence::{JsonFileVersionStore, VersionStore};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct Entry {
    topic: Topic,
    version: Version,
}

/// `keelctl versions` subcommands.
#[derive(Debug, Subcommand)]
pub enum VersionsCommand {
    /// List recorded installed versions.
    List(ListArgs),
    /// Record an installed version for a topic.
    Set {
        /// Topic to update.
        topic: String,
        /// Version to record.
        version: String,
    },
    /// Reset a topic to the origin version `0`.
    Clear {
        /// Topic to reset.
        topic: String,
    },
}

/// Output options for list commands.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print JSON instead of tab-separated lines.
    #[arg(long)]
    pub json: bool,
}

/// Execute a `versions` subcommand against the configured version store.
pub fn run(command: VersionsCommand, config: &KeelConfig) -> Result<()> {
    let path = config
        .stores
        .versions
        .as_deref()
        .ok_or_else(|| anyhow!("no version store configured; set [stores].versions"))?;
    let store = JsonFileVersionStore::new(path);
    match command {
        VersionsCommand::List(args) => {
            let mut entries = Vec::new();
            for topic in store.topics().context("listing version store")? {
                let version = store.read(&topic)?;
                entries.push(Entry { topic, version });
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    println!("{}\t{}", entry.topic, entry.version);
                }
            }
        }
        VersionsCommand::Set { topic, version } => {
            let topic = Topic::new(topic);
            let version = Version::new(version);
            store
                .write(&topic, &version)
                .with_context(|| format!("recording {topic} at {version}"))?;
            info!(%topic, %version, "installed version recorded");
            println!("{topic}\t{version}");
        }
        VersionsCommand::Clear { topic } => {
            let topic = Topic::new(topic);
            store
                .write(&topic, &Version::origin())
                .with_context(|| format!("resetting {topic}"))?;
            info!(%topic, "installed version reset");
            println!("{topic}\t{}", Version::origin());
        }
    }
    Ok(())
}
