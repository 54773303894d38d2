//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Store contracts consumed by the patch sequencer and the lifecycle engine,
//! together with the in-memory and JSON file adapters and the helper used to
//! carry recorded state from one store to another.

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wrapper for IO errors encountered while reading/writing store files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The backing location cannot hold a store, e.g. a directory sits at the file path.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub mod json_file;
pub mod memory;
pub mod migrate;
pub mod open;
pub mod store;

pub use json_file::{JsonFileLifecycleStore, JsonFileVersionStore};
pub use memory::{MemoryLifecycleStore, MemoryVersionStore};
pub use migrate::{migrate_lifecycle, migrate_versions};
pub use open::{open_lifecycle_store, open_stores, open_version_store};
pub use store::{LifecycleState, LifecycleStore, VersionStore};

