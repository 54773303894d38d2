//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use indexmap::IndexMap;
use keel_common::{Topic, Version};
use parking_lot::Mutex;

use crate::store::{LifecycleState, LifecycleStore, VersionStore};
use crate::Result;

/// Bootstrap version store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    entries: Mutex<IndexMap<Topic, Version>>,
}

impl MemoryVersionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded entry.
    pub fn entries(&self) -> IndexMap<Topic, Version> {
        self.entries.lock().clone()
    }
}

impl VersionStore for MemoryVersionStore {
    fn read(&self, topic: &Topic) -> Result<Version> {
        Ok(self.entries.lock().get(topic).cloned().unwrap_or_default())
    }

    fn write(&self, topic: &Topic, version: &Version) -> Result<()> {
        self.entries.lock().insert(topic.clone(), version.clone());
        Ok(())
    }

    fn topics(&self) -> Result<Vec<Topic>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Bootstrap lifecycle store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryLifecycleStore {
    entries: Mutex<IndexMap<Topic, LifecycleState>>,
}

impl MemoryLifecycleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded entry.
    pub fn entries(&self) -> IndexMap<Topic, LifecycleState> {
        self.entries.lock().clone()
    }
}

impl LifecycleStore for MemoryLifecycleStore {
    fn read(&self, topic: &Topic) -> Result<LifecycleState> {
        Ok(self.entries.lock().get(topic).copied().unwrap_or_default())
    }

    fn write(&self, topic: &Topic, state: LifecycleState) -> Result<()> {
        self.entries.lock().insert(topic.clone(), state);
        Ok(())
    }

    fn topics(&self) -> Result<Vec<Topic>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}
