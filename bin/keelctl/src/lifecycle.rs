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
use clap::Subcommand;
use keel_common::{KeelConfig, Topic};
use keel_persistence::{JsonFileLifecycleStore, LifecycleState, LifecycleStore};
use serde::Serialize;
use tracing::info;

use crate::versions::ListArgs;

#[derive(Debug, Serialize)]
struct Entry {
    topic: Topic,
    #[serde(flatten)]
    state: LifecycleState,
}

/// `keelctl lifecycle` subcommands.
#[derive(Debug, Subcommand)]
pub enum LifecycleCommand {
    /// List persisted setup/cleanup flags.
    List(ListArgs),
    /// Forget a module's setup/cleanup flags so its setup runs again.
    Reset {
        /// Module topic.
        topic: String,
    },
}

/// Execute a `lifecycle` subcommand against the configured lifecycle store.
pub fn run(command: LifecycleCommand, config: &KeelConfig) -> Result<()> {
    let path = config
        .stores
        .lifecycle
        .as_deref()
        .ok_or_else(|| anyhow!("no lifecycle store configured; set [stores].lifecycle"))?;
    let store = JsonFileLifecycleStore::new(path);
    match command {
        LifecycleCommand::List(args) => {
            let mut entries = Vec::new();
            for topic in store.topics().context("listing lifecycle store")? {
                let state = store.read(&topic)?;
                entries.push(Entry { topic, state });
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    println!(
                        "{}\tsetup={}\tcleanup={}",
                        entry.topic, entry.state.setup_complete, entry.state.cleanup_complete
                    );
                }
            }
        }
        LifecycleCommand::Reset { topic } => {
            let topic = Topic::new(topic);
            store
                .write(&topic, LifecycleState::default())
                .with_context(|| format!("resetting {topic}"))?;
            info!(%topic, "lifecycle flags reset");
            println!("{topic}\tsetup=false\tcleanup=false");
        }
    }
    Ok(())
}
