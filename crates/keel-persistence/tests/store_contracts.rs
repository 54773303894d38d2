//! ---
//! keel_section: "03-persistence"
//! keel_subsection: "integration-tests"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Persistence abstractions and storage bindings."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
//! Every adapter must satisfy the same read/write contract.

use std::sync::Arc;
use std::thread;

use keel_common::{Topic, Version};
use keel_persistence::{
    JsonFileLifecycleStore, JsonFileVersionStore, LifecycleState, LifecycleStore,
    MemoryLifecycleStore, MemoryVersionStore, VersionStore,
};
use tempfile::tempdir;

fn version_contract(store: &dyn VersionStore) {
    let db = Topic::namespaced("app", "db");
    assert!(store.read(&db).unwrap().is_origin(), "absent topic reads as origin");
    assert!(store.topics().unwrap().is_empty());

    store.write(&db, &Version::new("1.2.0")).unwrap();
    store.write(&"cache".into(), &Version::new("0.3")).unwrap();
    store.write(&db, &Version::new("1.3.0")).unwrap();
    assert_eq!(store.read(&db).unwrap().as_str(), "1.3.0");
    assert_eq!(store.topics().unwrap(), vec![db.clone(), Topic::from("cache")]);
}

fn lifecycle_contract(store: &dyn LifecycleStore) {
    let db = Topic::from("db");
    assert_eq!(store.read(&db).unwrap(), LifecycleState::default());

    store.write(&db, LifecycleState::SET_UP).unwrap();
    assert!(store.read(&db).unwrap().setup_complete);
    store.write(&db, LifecycleState::CLEANED_UP).unwrap();
    let state = store.read(&db).unwrap();
    assert!(state.cleanup_complete && !state.setup_complete);
    assert_eq!(store.topics().unwrap(), vec![db]);
}

#[test]
fn memory_version_store_contract() {
    version_contract(&MemoryVersionStore::new());
}

#[test]
fn json_version_store_contract() {
    let dir = tempdir().unwrap();
    version_contract(&JsonFileVersionStore::new(dir.path().join("versions.json")));
}

#[test]
fn memory_lifecycle_store_contract() {
    lifecycle_contract(&MemoryLifecycleStore::new());
}

#[test]
fn json_lifecycle_store_contract() {
    let dir = tempdir().unwrap();
    lifecycle_contract(&JsonFileLifecycleStore::new(dir.path().join("nested/lifecycle.json")));
}

#[test]
fn json_store_serialises_concurrent_writers() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonFileVersionStore::new(dir.path().join("versions.json")));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                store
                    .write(&Topic::new(format!("topic-{i}")), &Version::new(format!("{i}.0")))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.topics().unwrap().len(), 8);
    assert_eq!(store.read(&"topic-7".into()).unwrap(), Version::new("7"));
}
