//! Cross-module scenarios: toggling, external reconciliation, view
//! consistency, and session lifecycle, driven through a mock task engine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::controller::RunController;
use crate::engine::{Execution, ExecutionHandle, TaskDefinition, TaskEngine, TaskSpec};
use crate::error::{Result, ScriptButtonsError};
use crate::history::StateStore;
use crate::registry::{RunEntry, RunOrigin};
use crate::session::Session;
use crate::view::{RunIndicator, ViewModel, ViewSurface};

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Debug, Default)]
struct MockHandle {
    terminations: AtomicUsize,
}

impl ExecutionHandle for MockHandle {
    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

type StartHook = Box<dyn Fn(&TaskSpec, &Arc<dyn ExecutionHandle>) + Send + Sync>;

/// Records launches and hands out counting handles. `on_start` runs after
/// the handle exists but before `start` returns, to simulate work that
/// interleaves with the launch.
#[derive(Default)]
struct MockEngine {
    starts: Mutex<Vec<TaskSpec>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
    fail_next: AtomicBool,
    on_start: Mutex<Option<StartHook>>,
}

impl MockEngine {
    fn started_commands(&self) -> Vec<String> {
        self.starts.lock().iter().map(|s| s.command.clone()).collect()
    }

    fn handle(&self, index: usize) -> Arc<MockHandle> {
        self.handles.lock()[index].clone()
    }
}

impl TaskEngine for MockEngine {
    fn start(&self, spec: TaskSpec) -> Result<Arc<dyn ExecutionHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ScriptButtonsError::EngineStart {
                command: spec.command.clone(),
                message: "engine rejected launch".to_string(),
            });
        }
        let handle = Arc::new(MockHandle::default());
        self.handles.lock().push(handle.clone());
        let dyn_handle: Arc<dyn ExecutionHandle> = handle;
        if let Some(hook) = self.on_start.lock().as_ref() {
            hook(&spec, &dyn_handle);
        }
        self.starts.lock().push(spec);
        Ok(dyn_handle)
    }
}

/// In-memory StateStore for scenario tests
#[derive(Default)]
struct MemoryStore {
    values: Mutex<HashMap<String, Vec<String>>>,
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<String>> {
        self.values.lock().get(key).cloned()
    }

    fn update(&self, key: &str, value: &[String]) -> anyhow::Result<()> {
        self.values.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSurface {
    renders: Mutex<Vec<ViewModel>>,
}

impl RecordingSurface {
    fn last(&self) -> Option<ViewModel> {
        self.renders.lock().last().cloned()
    }
}

impl ViewSurface for RecordingSurface {
    fn render(&self, view: &ViewModel) {
        self.renders.lock().push(view.clone());
    }
}

fn external_execution(script: &str, path: Option<PathBuf>) -> (Execution, Arc<MockHandle>) {
    let handle = Arc::new(MockHandle::default());
    let execution = Execution {
        definition: TaskDefinition {
            kind: crate::engine::TASK_KIND.to_string(),
            script: Some(script.to_string()),
            path,
        },
        handle: handle.clone(),
    };
    (execution, handle)
}

struct Fixture {
    root: tempfile::TempDir,
    engine: Arc<MockEngine>,
    controller: Arc<RunController>,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::default());
        let controller = Arc::new(RunController::new(
            root.path().to_path_buf(),
            engine.clone(),
            Arc::new(MemoryStore::default()),
            Config::default(),
        ));
        controller.load_history();
        Fixture {
            root,
            engine,
            controller,
        }
    }

    fn key(&self, sub: &str, script: &str) -> String {
        if sub.is_empty() {
            format!("{}::{}", self.root.path().display(), script)
        } else {
            format!("{}/{}::{}", self.root.path().display(), sub, script)
        }
    }
}

// =============================================================================
// Toggle scenarios
// =============================================================================

#[test]
fn toggle_with_yarn_lockfile_launches_yarn_and_marks_running() {
    let fixture = Fixture::new();
    std::fs::write(fixture.root.path().join("yarn.lock"), "").unwrap();
    let key = fixture.key("", "build");

    fixture.controller.toggle(&key).unwrap();

    assert_eq!(fixture.engine.started_commands(), vec!["yarn build"]);
    assert!(fixture.controller.registry().is_running(&key));

    let view = fixture.controller.compute_view();
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].label, "build");
    assert_eq!(view.rows[0].relative_path, ".");
    assert!(view.rows[0].is_running);
}

#[test]
fn second_toggle_stops_and_terminates_exactly_once() {
    let fixture = Fixture::new();
    let key = fixture.key("", "dev");

    fixture.controller.toggle(&key).unwrap();
    assert!(fixture.controller.registry().is_running(&key));

    fixture.controller.toggle(&key).unwrap();
    assert!(!fixture.controller.registry().is_running(&key));
    assert_eq!(fixture.engine.handle(0).terminations.load(Ordering::SeqCst), 1);

    // History keeps the key after the stop
    assert_eq!(fixture.controller.history_keys(), vec![key]);
}

#[test]
fn relative_directory_canonicalizes_against_workspace_root() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(fixture.root.path().join("pkgA")).unwrap();

    fixture.controller.toggle("pkgA::test").unwrap();

    let canonical = fixture.key("pkgA", "test");
    assert!(fixture.controller.registry().is_running(&canonical));
    assert_eq!(fixture.controller.history_keys(), vec![canonical.clone()]);

    // Toggling via the absolute form stops the same run
    fixture.controller.toggle(&canonical).unwrap();
    assert!(!fixture.controller.registry().is_running(&canonical));
}

#[test]
fn malformed_key_is_ignored() {
    let fixture = Fixture::new();
    fixture.controller.toggle("no-separator-here").unwrap();
    assert!(fixture.engine.started_commands().is_empty());
    assert!(fixture.controller.history_keys().is_empty());
}

#[test]
fn rejected_launch_leaves_no_state_behind() {
    let fixture = Fixture::new();
    fixture.engine.fail_next.store(true, Ordering::SeqCst);
    let key = fixture.key("", "build");

    // The failure is logged, not surfaced
    fixture.controller.toggle(&key).unwrap();

    assert!(!fixture.controller.registry().is_running(&key));
    assert!(fixture.controller.history_keys().is_empty());
}

#[test]
fn lost_registration_race_converts_to_a_stop() {
    let fixture = Fixture::new();
    let key = fixture.key("", "build");

    // Simulate a concurrent toggle winning between this call's running
    // check and its registration step.
    let racing_handle = Arc::new(MockHandle::default());
    {
        let registry = fixture.controller.registry().clone();
        let racing = racing_handle.clone();
        let race_key = key.clone();
        *fixture.engine.on_start.lock() = Some(Box::new(move |_, _| {
            let entry = RunEntry::new(racing.clone(), RunOrigin::SelfStarted);
            assert!(registry.adopt(&race_key, entry));
        }));
    }

    fixture.controller.toggle(&key).unwrap();

    // Both executions are gone: the duplicate was torn down and the call
    // became the stop half of the pair.
    assert!(!fixture.controller.registry().is_running(&key));
    assert_eq!(fixture.engine.handle(0).terminations.load(Ordering::SeqCst), 1);
    assert_eq!(racing_handle.terminations.load(Ordering::SeqCst), 1);
}

#[test]
fn own_start_event_arriving_first_is_benign() {
    let fixture = Fixture::new();
    let key = fixture.key("", "build");

    // Simulate the event pump reconciling our own ProcessStart before the
    // launch path reaches its registration step.
    {
        let registry = fixture.controller.registry().clone();
        let race_key = key.clone();
        *fixture.engine.on_start.lock() = Some(Box::new(move |_, handle| {
            let entry = RunEntry::new(handle.clone(), RunOrigin::External);
            assert!(registry.adopt(&race_key, entry));
        }));
    }

    fixture.controller.toggle(&key).unwrap();

    assert!(fixture.controller.registry().is_running(&key));
    assert_eq!(fixture.engine.handle(0).terminations.load(Ordering::SeqCst), 0);
}

#[test]
fn persistence_failure_aborts_after_registration() {
    struct FailingStore;
    impl StateStore for FailingStore {
        fn get(&self, _key: &str) -> Option<Vec<String>> {
            None
        }
        fn update(&self, _key: &str, _value: &[String]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::default());
    let controller = RunController::new(
        root.path().to_path_buf(),
        engine.clone(),
        Arc::new(FailingStore),
        Config::default(),
    );
    let key = format!("{}::build", root.path().display());

    let err = controller.toggle(&key).unwrap_err();
    assert!(matches!(err, ScriptButtonsError::Persistence(_)));

    // The run is real and stays tracked; only the history write failed.
    assert!(controller.registry().is_running(&key));
    assert!(controller.history_keys().is_empty());
}

// =============================================================================
// External reconciliation
// =============================================================================

#[test]
fn external_start_becomes_visible_and_stoppable() {
    let fixture = Fixture::new();
    let (execution, handle) = external_execution("lint", None);

    fixture.controller.on_task_start(&execution).unwrap();

    let key = fixture.key("", "lint");
    assert!(fixture.controller.registry().is_running(&key));
    assert_eq!(fixture.controller.history_keys(), vec![key.clone()]);

    let view = fixture.controller.compute_view();
    assert!(view.rows[0].is_running);

    // And it can be stopped through this system
    fixture.controller.toggle(&key).unwrap();
    assert_eq!(handle.terminations.load(Ordering::SeqCst), 1);
}

#[test]
fn external_start_with_path_uses_that_directory() {
    let fixture = Fixture::new();
    let pkg = fixture.root.path().join("pkgA");
    let (execution, _handle) = external_execution("test", Some(pkg.clone()));

    fixture.controller.on_task_start(&execution).unwrap();

    let key = fixture.key("pkgA", "test");
    assert!(fixture.controller.registry().is_running(&key));
}

#[test]
fn foreign_task_kinds_are_ignored() {
    let fixture = Fixture::new();
    let handle: Arc<dyn ExecutionHandle> = Arc::new(MockHandle::default());
    let execution = Execution {
        definition: TaskDefinition {
            kind: "shell".to_string(),
            script: Some("build".to_string()),
            path: None,
        },
        handle,
    };

    fixture.controller.on_task_start(&execution).unwrap();
    assert!(fixture.controller.registry().is_empty());
    assert!(fixture.controller.history_keys().is_empty());
}

#[test]
fn start_event_for_tracked_run_is_idempotent() {
    let fixture = Fixture::new();
    let key = fixture.key("", "build");
    fixture.controller.toggle(&key).unwrap();

    let (execution, _handle) = external_execution("build", None);
    fixture.controller.on_task_start(&execution).unwrap();

    assert_eq!(fixture.controller.registry().len(), 1);
    assert_eq!(fixture.controller.history_keys(), vec![key]);
}

#[test]
fn end_event_removes_the_tracked_run() {
    let fixture = Fixture::new();
    let key = fixture.key("", "build");
    fixture.controller.toggle(&key).unwrap();

    let (execution, _handle) = external_execution("build", None);
    fixture.controller.on_task_end(&execution, 0);

    assert!(!fixture.controller.registry().is_running(&key));
    // The row remains, stopped
    let view = fixture.controller.compute_view();
    assert_eq!(view.rows.len(), 1);
    assert!(!view.rows[0].is_running);
}

#[test]
fn end_event_for_untracked_run_is_a_noop() {
    let fixture = Fixture::new();
    let (execution, _handle) = external_execution("never-started", None);

    fixture.controller.on_task_end(&execution, 1);

    assert!(fixture.controller.registry().is_empty());
    assert!(fixture.controller.history_keys().is_empty());
}

// =============================================================================
// History commands and view consistency
// =============================================================================

#[test]
fn deleting_a_row_leaves_the_run_alive() {
    let fixture = Fixture::new();
    let key = fixture.key("pkgA", "test");
    fixture.controller.toggle(&key).unwrap();

    fixture.controller.delete_history_item(&key).unwrap();

    assert!(fixture.controller.registry().is_running(&key));
    assert!(fixture.controller.compute_view().rows.is_empty());
    assert_eq!(fixture.engine.handle(0).terminations.load(Ordering::SeqCst), 0);
}

#[test]
fn reset_history_does_not_touch_the_registry() {
    let fixture = Fixture::new();
    fixture.controller.toggle(&fixture.key("", "build")).unwrap();
    fixture.controller.toggle(&fixture.key("", "dev")).unwrap();

    fixture.controller.reset_history().unwrap();

    assert!(fixture.controller.history_keys().is_empty());
    assert_eq!(fixture.controller.registry().len(), 2);
}

#[test]
fn both_surfaces_receive_the_same_rows() {
    let fixture = Fixture::new();
    let button_bar = Arc::new(RecordingSurface::default());
    let tree = Arc::new(RecordingSurface::default());
    fixture.controller.add_surface(button_bar.clone());
    fixture.controller.add_surface(tree.clone());

    fixture.controller.toggle(&fixture.key("", "build")).unwrap();

    let bar_view = button_bar.last().unwrap();
    let tree_view = tree.last().unwrap();
    assert_eq!(bar_view, tree_view);
    assert_eq!(bar_view.rows.len(), 1);
}

#[test]
fn config_change_switches_the_running_indicator() {
    let fixture = Fixture::new();
    let surface = Arc::new(RecordingSurface::default());
    fixture.controller.add_surface(surface.clone());

    fixture.controller.update_config(Config { spin_icon: false });
    assert_eq!(
        surface.last().unwrap().running_indicator,
        RunIndicator::StaticSquare
    );

    fixture.controller.update_config(Config { spin_icon: true });
    assert_eq!(
        surface.last().unwrap().running_indicator,
        RunIndicator::Animated
    );
}

// =============================================================================
// Session lifecycle
// =============================================================================

fn session_fixture() -> (Session, Arc<MockEngine>, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::default());
    let mut session = Session::with_config_path(
        root.path().to_path_buf(),
        engine.clone(),
        Arc::new(MemoryStore::default()),
        root.path().join("config.json"),
    );
    session.activate();
    (session, engine, root)
}

#[test]
fn lone_history_click_does_nothing() {
    let (session, engine, root) = session_fixture();
    let key = format!("{}::build", root.path().display());

    session.history_item_clicked(&key).unwrap();

    assert!(engine.started_commands().is_empty());
}

#[test]
fn double_click_within_window_toggles() {
    let (session, engine, root) = session_fixture();
    let key = format!("{}::build", root.path().display());
    let t1 = Instant::now();

    session.history_item_clicked_at(&key, t1).unwrap();
    session
        .history_item_clicked_at(&key, t1 + Duration::from_millis(100))
        .unwrap();

    assert_eq!(engine.started_commands().len(), 1);
    assert!(session.controller().registry().is_running(&key));
}

#[test]
fn slow_second_click_does_not_toggle() {
    let (session, engine, root) = session_fixture();
    let key = format!("{}::build", root.path().display());
    let t1 = Instant::now();

    session.history_item_clicked_at(&key, t1).unwrap();
    session
        .history_item_clicked_at(&key, t1 + Duration::from_millis(350))
        .unwrap();

    assert!(engine.started_commands().is_empty());
}

#[test]
fn deactivate_terminates_every_live_run() {
    let (mut session, engine, root) = session_fixture();
    let build = format!("{}::build", root.path().display());
    let dev = format!("{}::dev", root.path().display());
    session.toggle(&build).unwrap();
    session.toggle(&dev).unwrap();

    session.deactivate();

    assert!(session.controller().registry().is_empty());
    assert_eq!(engine.handle(0).terminations.load(Ordering::SeqCst), 1);
    assert_eq!(engine.handle(1).terminations.load(Ordering::SeqCst), 1);

    // Deactivation is idempotent; a second call must not re-terminate
    session.deactivate();
    assert_eq!(engine.handle(0).terminations.load(Ordering::SeqCst), 1);
}

#[test]
fn engine_events_flow_through_the_pump() {
    let (mut session, _engine, root) = session_fixture();
    let (tx, rx) = std::sync::mpsc::channel();
    session.attach_engine_events(rx);

    let key = format!("{}::lint", root.path().display());
    let (execution, _handle) = external_execution("lint", None);

    tx.send(crate::engine::EngineEvent::ProcessStart(execution.clone()))
        .unwrap();
    assert!(wait_until(|| session.controller().registry().is_running(&key)));

    tx.send(crate::engine::EngineEvent::ProcessEnd(execution, 0))
        .unwrap();
    assert!(wait_until(|| !session.controller().registry().is_running(&key)));
    assert_eq!(session.controller().history_keys(), vec![key]);
}

/// Poll until `predicate` holds, bounded at two seconds
fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

#[test]
fn history_survives_a_session_restart() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let engine = Arc::new(MockEngine::default());
    let key = format!("{}::build", root.path().display());

    let mut first = Session::with_config_path(
        root.path().to_path_buf(),
        engine.clone(),
        store.clone(),
        root.path().join("config.json"),
    );
    first.activate();
    first.toggle(&key).unwrap();
    first.deactivate();

    let mut second = Session::with_config_path(
        root.path().to_path_buf(),
        engine,
        store,
        root.path().join("config.json"),
    );
    second.activate();

    // The row is back, stopped: registry state is never persisted
    let view = second.controller().compute_view();
    assert_eq!(view.rows.len(), 1);
    assert!(!view.rows[0].is_running);
}
