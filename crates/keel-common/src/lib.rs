//! ---
//! keel_section: "01-core-functionality"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Shared primitives and utilities for the patch and lifecycle engines."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
//! Core shared primitives for the Keel workspace.
//! This crate exposes topic identifiers, the version comparator,
//! configuration loading, and logging bootstrap consumed across the workspace.

pub mod config;
pub mod logging;
pub mod topic;
pub mod version;

pub use config::{KeelConfig, LifecycleConfig, LoggingConfig, MissingActionPolicy, StoreConfig};
pub use logging::{init_tracing, LogFormat};
pub use topic::Topic;
pub use version::Version;
