//! ---
//! keel_section: "15-testing-qa-runbook"
//! keel_subsection: "integration-tests"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Boot and shutdown scenarios across the lifecycle engine and patch sequencer."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keel_common::{Topic, Version};
use keel_lifecycle::{LifecycleEngine, LifecycleError, ModuleSpec, Phase};
use keel_persistence::{
    JsonFileLifecycleStore, JsonFileVersionStore, LifecycleState, LifecycleStore, VersionStore,
};
use keel_versioning::{PatchRegistry, PatchSequencer};
use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};

type Log = Arc<Mutex<Vec<String>>>;

fn schema() -> Topic {
    Topic::namespaced("app", "schema")
}

struct Paths {
    _dir: TempDir,
    versions: PathBuf,
    lifecycle: PathBuf,
}

impl Paths {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        Self {
            versions: dir.path().join("versions.json"),
            lifecycle: dir.path().join("lifecycle.json"),
            _dir: dir,
        }
    }
}

fn schema_patches(log: &Log, healthy: &Arc<AtomicBool>) -> Arc<PatchRegistry> {
    let registry = Arc::new(PatchRegistry::new());
    for version in ["1.0", "1.1", "2.0"] {
        let log = log.clone();
        let healthy = healthy.clone();
        registry.upgrade(schema(), version, move || {
            if version == "1.1" && !healthy.load(Ordering::SeqCst) {
                anyhow::bail!("schema lock held");
            }
            log.lock().push(format!("up {version}"));
            Ok(())
        });
    }
    for version in ["1.1", "2.0"] {
        let log = log.clone();
        registry.downgrade(schema(), version, move || {
            log.lock().push(format!("down {version}"));
            Ok(())
        });
    }
    registry
}

struct Boot {
    engine: LifecycleEngine,
    sequencer: Arc<PatchSequencer>,
}

fn boot(paths: &Paths, registry: Arc<PatchRegistry>, log: &Log) -> Boot {
    let sequencer = Arc::new(
        PatchSequencer::new(registry)
            .with_version_store(Arc::new(JsonFileVersionStore::new(&paths.versions))),
    );
    let engine = LifecycleEngine::new()
        .with_lifecycle_store(Arc::new(JsonFileLifecycleStore::new(&paths.lifecycle)));

    let setup_log = log.clone();
    let level = sequencer.clone();
    let teardown = sequencer.clone();
    engine
        .register(
            "db",
            ModuleSpec::new()
                .on_setup(move || {
                    setup_log.lock().push("create database".into());
                    Ok(())
                })
                .on_start(move || {
                    level.level(&schema())?;
                    Ok(())
                })
                .on_cleanup(move || {
                    let installed = teardown.installed(&schema())?;
                    teardown.apply(&schema(), installed, Version::origin())?;
                    Ok(())
                }),
        )
        .unwrap();
    let api_log = log.clone();
    engine
        .register(
            "api",
            ModuleSpec::new().depends_on(["db"]).on_start(move || {
                api_log.lock().push("serve api".into());
                Ok(())
            }),
        )
        .unwrap();
    Boot { engine, sequencer }
}

fn stored_version(path: &Path) -> Version {
    JsonFileVersionStore::new(path).read(&schema()).unwrap()
}

#[test]
fn first_boot_sets_up_and_levels_then_later_boots_only_apply_new_patches() {
    let paths = Paths::new();
    let log = Log::default();
    let healthy = Arc::new(AtomicBool::new(true));
    let registry = schema_patches(&log, &healthy);
    registry.declare_target(schema(), "1.1").unwrap();

    let first = boot(&paths, registry.clone(), &log);
    first.engine.start("api").unwrap();
    first.engine.stop_all().unwrap();
    assert_eq!(*log.lock(), ["create database", "up 1.0", "up 1.1", "serve api"]);
    assert_eq!(stored_version(&paths.versions), Version::new("1.1"));
    log.lock().clear();

    registry.redefine_target(schema(), "2.0");
    let second = boot(&paths, registry, &log);
    second.engine.start("api").unwrap();
    assert_eq!(*log.lock(), ["up 2.0", "serve api"]);
    assert_eq!(second.sequencer.installed(&schema()).unwrap(), Version::new("2.0"));
}

#[test]
fn failed_patch_during_boot_is_recorded_and_resumable() {
    let paths = Paths::new();
    let log = Log::default();
    let healthy = Arc::new(AtomicBool::new(false));
    let registry = schema_patches(&log, &healthy);
    registry.declare_target(schema(), "2.0").unwrap();
    let node = boot(&paths, registry, &log);

    let err = node.engine.start("api").unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::ActionFailed { phase: Phase::Start, .. }
    ));
    assert!(node.engine.started_topics().is_empty());
    assert!(stored_version(&paths.versions).is_origin());
    let recorded = node.engine.error(&"db".into()).unwrap();
    assert!(recorded.error.contains("schema lock held"), "{}", recorded.error);
    assert!(node.engine.status().unwrap().errors.contains_key(&Topic::from("api")));

    healthy.store(true, Ordering::SeqCst);
    node.engine.clear_errors();
    node.engine.start("api").unwrap();
    assert_eq!(
        *log.lock(),
        ["create database", "up 1.0", "up 1.0", "up 1.1", "up 2.0", "serve api"]
    );
    assert_eq!(stored_version(&paths.versions), Version::new("2.0"));
}

#[test]
fn cleanup_tears_down_dependents_and_downgrades_schema() {
    let paths = Paths::new();
    let log = Log::default();
    let healthy = Arc::new(AtomicBool::new(true));
    let registry = schema_patches(&log, &healthy);
    registry.declare_target(schema(), "2.0").unwrap();
    let node = boot(&paths, registry, &log);
    node.engine.setup(["api"]).unwrap();
    node.engine.start("api").unwrap();
    log.lock().clear();

    node.engine.cleanup("db").unwrap();
    assert_eq!(*log.lock(), ["down 2.0", "down 1.1"]);
    assert!(stored_version(&paths.versions).is_origin());
    let lifecycle = JsonFileLifecycleStore::new(&paths.lifecycle);
    assert_eq!(lifecycle.read(&"db".into()).unwrap(), LifecycleState::CLEANED_UP);
    assert_eq!(lifecycle.read(&"api".into()).unwrap(), LifecycleState::CLEANED_UP);
    assert!(node.engine.started_topics().is_empty());
}
