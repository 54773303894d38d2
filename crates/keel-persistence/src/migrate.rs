//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
//! Carry recorded state between stores, typically when a bootstrap in-memory
//! store is swapped for a persistent one after the process has already
//! started recording versions or setup flags.

use keel_common::Topic;
use tracing::info;

use crate::store::{LifecycleStore, VersionStore};
use crate::Result;

/// Copy every non-origin installed version for `topics` (or every topic the
/// source knows) into `destination`. Returns the topics that were copied.
pub fn migrate_versions(
    source: &dyn VersionStore,
    destination: &dyn VersionStore,
    topics: Option<&[Topic]>,
) -> Result<Vec<Topic>> {
    let candidates = match topics {
        Some(topics) => topics.to_vec(),
        None => source.topics()?,
    };
    let mut copied = Vec::new();
    for topic in candidates {
        let version = source.read(&topic)?;
        if version.is_origin() {
            continue;
        }
        destination.write(&topic, &version)?;
        copied.push(topic);
    }
    info!(copied = copied.len(), "version store migrated");
    Ok(copied)
}

/// Copy every recorded lifecycle state for `topics` (or every topic the
/// source knows) into `destination`. Returns the topics that were copied.
pub fn migrate_lifecycle(
    source: &dyn LifecycleStore,
    destination: &dyn LifecycleStore,
    topics: Option<&[Topic]>,
) -> Result<Vec<Topic>> {
    let candidates = match topics {
        Some(topics) => topics.to_vec(),
        None => source.topics()?,
    };
    let mut copied = Vec::new();
    for topic in candidates {
        let state = source.read(&topic)?;
        if !state.is_recorded() {
            continue;
        }
        destination.write(&topic, state)?;
        copied.push(topic);
    }
    info!(copied = copied.len(), "lifecycle store migrated");
    Ok(copied)
}
