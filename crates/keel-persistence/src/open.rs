//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;

use keel_common::StoreConfig;
use tracing::debug;

use crate::json_file::{JsonFileLifecycleStore, JsonFileVersionStore};
use crate::memory::{MemoryLifecycleStore, MemoryVersionStore};
use crate::store::{LifecycleStore, VersionStore};

/// File-backed version store at `path`, or an in-memory one when unset.
pub fn open_version_store(path: Option<&Path>) -> Arc<dyn VersionStore> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "using file-backed version store");
            Arc::new(JsonFileVersionStore::new(path))
        }
        None => Arc::new(MemoryVersionStore::new()),
    }
}

/// File-backed lifecycle store at `path`, or an in-memory one when unset.
pub fn open_lifecycle_store(path: Option<&Path>) -> Arc<dyn LifecycleStore> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "using file-backed lifecycle store");
            Arc::new(JsonFileLifecycleStore::new(path))
        }
        None => Arc::new(MemoryLifecycleStore::new()),
    }
}

/// Open both stores described by `config`.
pub fn open_stores(config: &StoreConfig) -> (Arc<dyn VersionStore>, Arc<dyn LifecycleStore>) {
    (
        open_version_store(config.versions.as_deref()),
        open_lifecycle_store(config.lifecycle.as_deref()),
    )
}
