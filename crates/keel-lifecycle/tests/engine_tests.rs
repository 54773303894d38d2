//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "integration-tests"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use keel_common::{MissingActionPolicy, Topic};
use keel_lifecycle::{
    EngineConfig, LifecycleEngine, LifecycleError, LifecycleMetrics, ModuleSpec, Phase,
};
use keel_persistence::{
    JsonFileLifecycleStore, LifecycleState, LifecycleStore, MemoryLifecycleStore,
};
use parking_lot::Mutex;
use prometheus::Registry;
use tempfile::tempdir;

type Log = Arc<Mutex<Vec<String>>>;

fn logged(log: &Log, entry: String) -> impl Fn() -> anyhow::Result<()> {
    let log = log.clone();
    move || {
        log.lock().push(entry.clone());
        Ok(())
    }
}

fn module(log: &Log, name: &str) -> ModuleSpec {
    ModuleSpec::new()
        .on_setup(logged(log, format!("setup {name}")))
        .on_start(logged(log, format!("start {name}")))
        .on_stop(logged(log, format!("stop {name}")))
        .on_cleanup(logged(log, format!("cleanup {name}")))
}

fn position(log: &Log, entry: &str) -> usize {
    log.lock()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} not logged"))
}

fn count(log: &Log, entry: &str) -> usize {
    log.lock().iter().filter(|e| *e == entry).count()
}

fn strict_engine() -> LifecycleEngine {
    LifecycleEngine::with_config(EngineConfig {
        missing_action_policy: MissingActionPolicy::Strict,
    })
}

#[test]
fn diamond_starts_every_dependency_once_in_order() {
    let log = Log::default();
    let engine = LifecycleEngine::new();
    // registered out of dependency order
    engine.register("app", module(&log, "app").depends_on(["api", "worker"])).unwrap();
    engine.register("api", module(&log, "api").depends_on(["db"])).unwrap();
    engine.register("worker", module(&log, "worker").depends_on(["db", "queue"])).unwrap();
    engine.register("queue", module(&log, "queue")).unwrap();
    engine.register("db", module(&log, "db")).unwrap();

    engine.start("worker").unwrap();
    engine.start("app").unwrap();
    engine.start("app").unwrap();

    for name in ["db", "queue", "api", "worker", "app"] {
        assert_eq!(count(&log, &format!("start {name}")), 1, "{name}");
    }
    assert!(position(&log, "start db") < position(&log, "start api"));
    assert!(position(&log, "start queue") < position(&log, "start worker"));
    assert!(position(&log, "start worker") < position(&log, "start app"));
    assert_eq!(engine.started_topics().len(), 5);
}

#[test]
fn missing_dependency_is_reported_before_any_action() {
    let log = Log::default();
    let engine = LifecycleEngine::new();
    engine.register("api", module(&log, "api").depends_on(["db"])).unwrap();
    engine.register("db", module(&log, "db").depends_on(["disk"])).unwrap();

    match engine.start("api").unwrap_err() {
        LifecycleError::MissingDependency { topic, dependency } => {
            assert_eq!(topic.as_str(), "db");
            assert_eq!(dependency.as_str(), "disk");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.lock().is_empty());
    assert!(engine.errors().is_empty());
}

#[test]
fn cycle_is_reported_before_any_action() {
    let log = Log::default();
    let engine = LifecycleEngine::new();
    engine.register("a", module(&log, "a").depends_on(["b"])).unwrap();
    engine.register("b", module(&log, "b").depends_on(["c"])).unwrap();
    engine.register("c", module(&log, "c").depends_on(["a"])).unwrap();

    match engine.start("a").unwrap_err() {
        LifecycleError::CircularDependency { unresolved } => {
            let names: Vec<&str> = unresolved.iter().map(Topic::as_str).collect();
            assert_eq!(names, ["a", "b", "c"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.lock().is_empty());
    assert!(engine.startup_order().is_err());
}

#[test]
fn failed_dependency_leaves_dependents_unstarted_and_recorded() {
    let log = Log::default();
    let engine = LifecycleEngine::new();
    engine.register("api", module(&log, "api").depends_on(["db"])).unwrap();
    engine
        .register("db", ModuleSpec::new().on_start(|| anyhow::bail!("connection refused")))
        .unwrap();

    let err = engine.start("api").unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::ActionFailed { ref topic, phase: Phase::Start, .. } if topic.as_str() == "db"
    ));
    assert!(engine.started_topics().is_empty());
    assert_eq!(count(&log, "start api"), 0);

    let db_error = engine.error(&"db".into()).expect("db failure recorded");
    assert!(db_error.error.contains("connection refused"));
    assert!(engine.error(&"api".into()).is_some());
}

#[test]
fn setup_starts_dependencies_and_persists() {
    let log = Log::default();
    let store = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(store.clone());
    engine.register("api", module(&log, "api").depends_on(["db"])).unwrap();
    engine.register("db", module(&log, "db")).unwrap();

    engine.setup(["api"]).unwrap();
    assert_eq!(*log.lock(), ["setup db", "start db", "setup api"]);
    assert_eq!(store.read(&"api".into()).unwrap(), LifecycleState::SET_UP);
    assert_eq!(store.read(&"db".into()).unwrap(), LifecycleState::SET_UP);
    assert!(!engine.is_started(&"api".into()));

    engine.setup(["api", "db"]).unwrap();
    assert_eq!(count(&log, "setup api"), 1);
    assert_eq!(count(&log, "setup db"), 1);
}

#[test]
fn setup_and_cleanup_require_a_store() {
    let engine = LifecycleEngine::new();
    engine.register("db", ModuleSpec::new()).unwrap();
    assert!(matches!(engine.setup(["db"]), Err(LifecycleError::NoStoreConfigured)));
    assert!(matches!(engine.cleanup("db"), Err(LifecycleError::NoStoreConfigured)));
}

#[test]
fn cleanup_waits_for_every_active_dependent() {
    let log = Log::default();
    let store = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(store.clone());
    engine.register("x", module(&log, "x")).unwrap();
    engine.register("y", module(&log, "y").depends_on(["x"])).unwrap();
    engine.register("z", module(&log, "z").depends_on(["x"])).unwrap();
    engine.setup(["y", "z"]).unwrap();
    engine.start("y").unwrap();
    engine.start("z").unwrap();

    engine.cleanup("y").unwrap();
    assert_eq!(store.read(&"y".into()).unwrap(), LifecycleState::CLEANED_UP);
    assert_eq!(store.read(&"x".into()).unwrap(), LifecycleState::SET_UP);
    assert!(engine.is_started(&"x".into()));
    log.lock().clear();

    engine.cleanup("x").unwrap();
    assert_eq!(*log.lock(), ["stop z", "cleanup z", "stop x", "cleanup x"]);
    assert_eq!(store.read(&"x".into()).unwrap(), LifecycleState::CLEANED_UP);
    assert!(engine.started_topics().is_empty());
}

#[test]
fn failed_dependent_cleanup_keeps_shared_dependency() {
    let store = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(store.clone());
    engine.register("x", ModuleSpec::new().on_setup(|| Ok(()))).unwrap();
    engine
        .register(
            "z",
            ModuleSpec::new()
                .depends_on(["x"])
                .on_cleanup(|| anyhow::bail!("volume busy")),
        )
        .unwrap();
    engine.setup(["z"]).unwrap();

    assert!(engine.cleanup("x").is_err());
    assert_eq!(store.read(&"x".into()).unwrap(), LifecycleState::SET_UP);
    assert_eq!(store.read(&"z".into()).unwrap(), LifecycleState::SET_UP);
    assert_eq!(engine.error(&"z".into()).unwrap().phase, Some(Phase::Cleanup));
}

#[test]
fn cleanup_state_is_written_after_action_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lifecycle.json");
    let store = Arc::new(JsonFileLifecycleStore::new(&path));
    let engine = LifecycleEngine::new().with_lifecycle_store(store.clone());
    let doomed = path.clone();
    engine
        .register(
            "db",
            ModuleSpec::new()
                .on_setup(|| Ok(()))
                .on_cleanup(move || Ok(std::fs::remove_file(&doomed)?)),
        )
        .unwrap();
    engine.setup(["db"]).unwrap();
    assert!(path.exists());

    engine.cleanup("db").unwrap();
    assert_eq!(store.read(&"db".into()).unwrap(), LifecycleState::CLEANED_UP);
}

#[test]
fn start_reruns_setup_after_cleanup() {
    let log = Log::default();
    let store = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(store);
    engine.register("db", module(&log, "db")).unwrap();
    engine.start("db").unwrap();
    engine.cleanup("db").unwrap();
    engine.start("db").unwrap();
    assert_eq!(
        *log.lock(),
        ["setup db", "start db", "stop db", "cleanup db", "setup db", "start db"]
    );
}

#[test]
fn vacuous_policy_records_modules_without_actions() {
    let store = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(store.clone());
    engine.register("db", ModuleSpec::new()).unwrap();

    engine.setup(["db"]).unwrap();
    assert_eq!(store.read(&"db".into()).unwrap(), LifecycleState::SET_UP);
    engine.cleanup("db").unwrap();
    assert_eq!(store.read(&"db".into()).unwrap(), LifecycleState::CLEANED_UP);
}

#[test]
fn strict_policy_rejects_requested_modules_without_actions() {
    let store = Arc::new(MemoryLifecycleStore::new());
    let engine = strict_engine().with_lifecycle_store(store.clone());
    engine.register("db", ModuleSpec::new()).unwrap();
    engine
        .register("api", ModuleSpec::new().depends_on(["db"]).on_setup(|| Ok(())))
        .unwrap();

    assert!(matches!(
        engine.setup(["db"]),
        Err(LifecycleError::ModuleHasNoSetupFunction(_))
    ));
    assert!(matches!(
        engine.cleanup("db"),
        Err(LifecycleError::ModuleHasNoCleanupFunction(_))
    ));
    assert!(!store.read(&"db".into()).unwrap().is_recorded());

    // dependencies reached recursively are still set up
    engine.setup(["api"]).unwrap();
    assert!(store.read(&"db".into()).unwrap().setup_complete);
}

#[test]
fn file_backed_setup_survives_engine_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lifecycle.json");
    let log = Log::default();

    let first = LifecycleEngine::new().with_lifecycle_store(Arc::new(JsonFileLifecycleStore::new(&path)));
    first.register("db", module(&log, "db")).unwrap();
    first.start("db").unwrap();
    first.stop_all().unwrap();

    let second = LifecycleEngine::new().with_lifecycle_store(Arc::new(JsonFileLifecycleStore::new(&path)));
    second.register("db", module(&log, "db")).unwrap();
    second.start("db").unwrap();
    assert_eq!(*log.lock(), ["setup db", "start db", "stop db", "start db"]);
}

#[test]
fn metrics_track_actions_and_started_modules() {
    let metrics = LifecycleMetrics::new(Arc::new(Registry::new())).unwrap();
    let engine = LifecycleEngine::new().with_metrics(metrics.clone());
    engine.register("db", ModuleSpec::new()).unwrap();
    engine
        .register("cache", ModuleSpec::new().on_start(|| anyhow::bail!("oom")))
        .unwrap();

    engine.start("db").unwrap();
    assert!(engine.start("cache").is_err());
    let db = Topic::from("db");
    let cache = Topic::from("cache");
    assert_eq!(metrics.actions(&db, Phase::Start), 1);
    assert_eq!(metrics.failures(&cache, Phase::Start), 1);
    assert_eq!(metrics.started(), 1);

    engine.stop("db").unwrap();
    assert_eq!(metrics.started(), 0);
}

#[test]
fn status_serializes_for_reporting() {
    let store: Arc<dyn LifecycleStore> = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(store);
    engine.register("db", ModuleSpec::new()).unwrap();
    engine.start("db").unwrap();

    let status = engine.status().unwrap();
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["setup_complete"], 0);
    assert_eq!(json["modules"][0]["state"], "started");
    assert_eq!(json["modules"][0]["persisted"]["setup_complete"], false);
    assert!(status.is_healthy());
}

#[test]
fn concurrent_starts_share_dependencies_once() {
    let log = Log::default();
    let engine = LifecycleEngine::new();
    let db_log = log.clone();
    engine
        .register(
            "db",
            ModuleSpec::new().on_start(move || {
                thread::sleep(Duration::from_millis(20));
                db_log.lock().push("start db".to_owned());
                Ok(())
            }),
        )
        .unwrap();
    engine.register("app", module(&log, "app").depends_on(["db"])).unwrap();
    engine.register("worker", module(&log, "worker").depends_on(["db"])).unwrap();
    let ready = Barrier::new(2);

    thread::scope(|s| {
        for name in ["app", "worker"] {
            let (engine, ready) = (&engine, &ready);
            s.spawn(move || {
                ready.wait();
                engine.start(name).unwrap();
            });
        }
    });

    for name in ["db", "app", "worker"] {
        assert_eq!(count(&log, &format!("start {name}")), 1, "{name}");
    }
    assert!(position(&log, "start db") < position(&log, "start app"));
    assert!(position(&log, "start db") < position(&log, "start worker"));
    assert_eq!(engine.started_topics()[0], Topic::from("db"));
    assert_eq!(engine.started_topics().len(), 3);
}

#[test]
fn scoped_store_is_not_visible_to_other_threads() {
    let log = Log::default();
    let base = Arc::new(MemoryLifecycleStore::new());
    let scoped = Arc::new(MemoryLifecycleStore::new());
    let engine = LifecycleEngine::new().with_lifecycle_store(base.clone());
    engine.register("db", module(&log, "db")).unwrap();
    let inside = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|| {
            engine.with_store(scoped.clone(), |_| {
                inside.wait();
                thread::sleep(Duration::from_millis(50));
            });
        });
        s.spawn(|| {
            inside.wait();
            engine.setup(["db"]).unwrap();
        });
    });

    let db = Topic::from("db");
    assert!(base.read(&db).unwrap().setup_complete);
    assert!(!scoped.read(&db).unwrap().setup_complete);
    assert_eq!(count(&log, "setup db"), 1);
}
