//! ---
//! keel_section: "04-versioning"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Version patch registry and sequencer."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Moves a topic between version states by running the registered patch
//! actions that lie between the installed version and the declared target,
//! in the order the direction of travel requires.

use keel_common::{Topic, Version};
use keel_persistence::StoreError;

pub mod metrics;
pub mod registry;
pub mod sequencer;

pub use metrics::PatchMetrics;
pub use registry::{Direction, InstalledResolver, PatchAction, PatchRegistry};
pub use sequencer::{ApplyOutcome, PatchPlan, PatchSequencer};

/// Result alias used throughout the versioning crate.
pub type Result<T> = std::result::Result<T, VersioningError>;

/// Errors raised while registering or applying patches.
#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    /// A patch action failed; the installed version was left untouched.
    #[error("{direction} patch {version} for topic {topic} failed")]
    PatchFailed {
        /// Topic being migrated.
        topic: Topic,
        /// Version boundary of the failing patch.
        version: Version,
        /// Direction of travel.
        direction: Direction,
        /// Error returned by the action.
        #[source]
        source: anyhow::Error,
    },
    /// `level` was asked to reconcile a topic without a declared target.
    #[error("no target version declared for topic {0}")]
    TargetNotDeclared(Topic),
    /// A different target was already declared for the topic.
    #[error("target for topic {topic} already declared as {existing}; refusing {requested}")]
    TargetRedeclared {
        /// Topic whose target was declared twice.
        topic: Topic,
        /// Previously declared target.
        existing: Version,
        /// Rejected target.
        requested: Version,
    },
    /// A topic-specific installed-version lookup failed.
    #[error("installed version lookup for topic {topic} failed")]
    InstalledOverrideFailed {
        /// Topic being resolved.
        topic: Topic,
        /// Error returned by the lookup.
        #[source]
        source: anyhow::Error,
    },
    /// The version store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
