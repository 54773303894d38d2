//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use keel_common::{Topic, Version};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Persisted one-time resource flags for a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    /// One-time setup has run and not been undone.
    #[serde(default)]
    pub setup_complete: bool,
    /// Cleanup has run since the last setup.
    #[serde(default)]
    pub cleanup_complete: bool,
}

impl LifecycleState {
    /// State written after a successful setup.
    pub const SET_UP: LifecycleState = LifecycleState {
        setup_complete: true,
        cleanup_complete: false,
    };

    /// State written after a successful cleanup.
    pub const CLEANED_UP: LifecycleState = LifecycleState {
        setup_complete: false,
        cleanup_complete: true,
    };

    /// Whether the state differs from the never-touched default.
    pub fn is_recorded(&self) -> bool {
        *self != LifecycleState::default()
    }
}

/// Installed-version persistence.
pub trait VersionStore: Send + Sync {
    /// Installed version for `topic`; `"0"` when nothing was recorded.
    fn read(&self, topic: &Topic) -> Result<Version>;
    /// Record `version` as installed for `topic`.
    fn write(&self, topic: &Topic, version: &Version) -> Result<()>;
    /// Topics with a recorded entry.
    fn topics(&self) -> Result<Vec<Topic>>;
}

/// Setup/cleanup flag persistence.
pub trait LifecycleStore: Send + Sync {
    /// Recorded flags for `topic`; both `false` when nothing was recorded.
    fn read(&self, topic: &Topic) -> Result<LifecycleState>;
    /// Record `state` for `topic`.
    fn write(&self, topic: &Topic, state: LifecycleState) -> Result<()>;
    /// Topics with a recorded entry.
    fn topics(&self) -> Result<Vec<Topic>>;
}
