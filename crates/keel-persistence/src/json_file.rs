//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use keel_common::{Topic, Version};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::store::{LifecycleState, LifecycleStore, VersionStore};
use crate::{Result, StoreError};

/// Load a topic-keyed JSON document. A missing or empty file is an empty map.
fn load_document<V: DeserializeOwned>(path: &Path) -> Result<IndexMap<Topic, V>> {
    if path.is_dir() {
        return Err(StoreError::Unavailable(format!(
            "{} is a directory, not a store file",
            path.display()
        )));
    }
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(IndexMap::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(IndexMap::new()),
        Err(err) => Err(err.into()),
    }
}

/// Rewrite the document atomically by persisting a sibling temp file over it.
fn save_document<V: Serialize>(path: &Path, document: &IndexMap<Topic, V>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, document)?;
    temp.write_all(b"\n")?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|err| StoreError::Io(err.error))?;
    debug!(path = %path.display(), entries = document.len(), "store document persisted");
    Ok(())
}

/// Version store backed by a JSON object of `topic -> version`.
#[derive(Debug)]
pub struct JsonFileVersionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileVersionStore {
    /// Bind the store to `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionStore for JsonFileVersionStore {
    fn read(&self, topic: &Topic) -> Result<Version> {
        let _guard = self.lock.lock();
        let mut document = load_document::<Version>(&self.path)?;
        Ok(document.swap_remove(topic).unwrap_or_default())
    }

    fn write(&self, topic: &Topic, version: &Version) -> Result<()> {
        let _guard = self.lock.lock();
        let mut document = load_document::<Version>(&self.path)?;
        document.insert(topic.clone(), version.clone());
        save_document(&self.path, &document)
    }

    fn topics(&self) -> Result<Vec<Topic>> {
        let _guard = self.lock.lock();
        Ok(load_document::<Version>(&self.path)?.into_keys().collect())
    }
}

/// Lifecycle store backed by a JSON object of `topic -> {setup_complete, cleanup_complete}`.
#[derive(Debug)]
pub struct JsonFileLifecycleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileLifecycleStore {
    /// Bind the store to `path`; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LifecycleStore for JsonFileLifecycleStore {
    fn read(&self, topic: &Topic) -> Result<LifecycleState> {
        let _guard = self.lock.lock();
        let document = load_document::<LifecycleState>(&self.path)?;
        Ok(document.get(topic).copied().unwrap_or_default())
    }

    fn write(&self, topic: &Topic, state: LifecycleState) -> Result<()> {
        let _guard = self.lock.lock();
        let mut document = load_document::<LifecycleState>(&self.path)?;
        document.insert(topic.clone(), state);
        save_document(&self.path, &document)
    }

    fn topics(&self) -> Result<Vec<Topic>> {
        let _guard = self.lock.lock();
        Ok(load_document::<LifecycleState>(&self.path)?
            .into_keys()
            .collect())
    }
}
