//! Run orchestration: toggling runs and reconciling externally observed
//! starts and ends against the registry.
//!
//! Every mutation path ends by recomputing the unified view and pushing it
//! to both surfaces, so the button bar and the history list always agree
//! with the registry.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::engine::{Execution, TaskDefinition, TaskEngine, TaskSpec};
use crate::error::{Result, ScriptButtonsError};
use crate::history::{HistoryStore, StateStore};
use crate::logging;
use crate::package_manager;
use crate::registry::{RunEntry, RunOrigin, RunRegistry};
use crate::run_key::RunKey;
use crate::view::{self, RunIndicator, ViewModel, ViewSurface};

/// Orchestrates run state across the registry, the history list, the task
/// engine, and the view surfaces.
pub struct RunController {
    workspace_root: PathBuf,
    engine: Arc<dyn TaskEngine>,
    registry: Arc<RunRegistry>,
    history: Mutex<HistoryStore>,
    config: RwLock<Config>,
    surfaces: RwLock<Vec<Arc<dyn ViewSurface>>>,
}

impl RunController {
    pub fn new(
        workspace_root: PathBuf,
        engine: Arc<dyn TaskEngine>,
        store: Arc<dyn StateStore>,
        config: Config,
    ) -> Self {
        RunController {
            workspace_root,
            engine,
            registry: Arc::new(RunRegistry::new()),
            history: Mutex::new(HistoryStore::new(store)),
            config: RwLock::new(config),
            surfaces: RwLock::new(Vec::new()),
        }
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Current history entries, in display order
    pub fn history_keys(&self) -> Vec<String> {
        self.history.lock().entries().to_vec()
    }

    /// Load the persisted history list. Call once at activation.
    pub fn load_history(&self) {
        self.history.lock().load();
    }

    /// Register a render target. Both surfaces receive every refresh.
    pub fn add_surface(&self, surface: Arc<dyn ViewSurface>) {
        self.surfaces.write().push(surface);
    }

    /// Swap in a new configuration and recompute the views
    pub fn update_config(&self, config: Config) {
        *self.config.write() = config;
        self.refresh_views();
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    // =========================================================================
    // Toggle
    // =========================================================================

    /// Start the run named by `raw_key` if stopped, stop it if running.
    ///
    /// The key's directory is resolved against the workspace root before
    /// any registry access; canonicalization happens once, here. Launch
    /// failures are logged and leave no state change; persistence failures
    /// propagate after the views have been refreshed.
    #[instrument(skip(self))]
    pub fn toggle(&self, raw_key: &str) -> Result<()> {
        let result = self.toggle_inner(raw_key);
        self.refresh_views();
        result
    }

    fn toggle_inner(&self, raw_key: &str) -> Result<()> {
        let Some(key) = RunKey::decode(raw_key) else {
            warn!(key = raw_key, "Ignoring malformed run key");
            return Ok(());
        };
        let key = key.canonical(&self.workspace_root);
        let canonical_key = key.encode();

        if self.registry.is_running(&canonical_key) {
            self.stop_run(&canonical_key);
            return Ok(());
        }

        match self.launch(&key, &canonical_key) {
            Ok(()) => Ok(()),
            Err(ScriptButtonsError::EngineStart { command, message }) => {
                // Caught here: the registry was never touched, so the user
                // sees no state change beyond the unchanged icon.
                error!(
                    command = %command,
                    error = %message,
                    key = %canonical_key,
                    "Launch rejected by task engine"
                );
                Ok(())
            }
            Err(ScriptButtonsError::AlreadyRunning { .. }) => {
                // Lost the registration race to a concurrent toggle. The
                // duplicate execution was already torn down; this call now
                // acts as the stop half of the pair.
                self.stop_run(&canonical_key);
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Start branch: detect the package manager, launch through the
    /// engine, register the handle under the canonical key, and record the
    /// key in history.
    fn launch(&self, key: &RunKey, canonical_key: &str) -> Result<()> {
        let manager = package_manager::detect(&key.package_dir, &self.workspace_root);
        let command = manager.run_command(&key.script);
        info!(
            key = canonical_key,
            manager = manager.binary(),
            command = %command,
            "Launching script"
        );

        let spec = TaskSpec {
            definition: TaskDefinition::package_script(key.script.clone(), key.package_dir.clone()),
            command,
            cwd: key.package_dir.clone(),
        };
        let handle = self.engine.start(spec)?;

        let entry = RunEntry::new(handle.clone(), RunOrigin::SelfStarted);
        if let Err(e) = self.registry.start(canonical_key, entry) {
            // Occupied by this launch's own reconciled start event: the run
            // is already tracked under this exact handle. Occupied by any
            // other execution: never overwrite; tear the duplicate down and
            // report the collision.
            if !self.registry.handle_matches(canonical_key, &handle) {
                handle.terminate();
                return Err(e);
            }
        }
        logging::log("RUN", &format!("Started task: {}", canonical_key));

        self.history.lock().add(canonical_key)?;
        Ok(())
    }

    /// Stop branch: remove the entry first, then request termination.
    /// The engine's end-of-process event is the authoritative second
    /// confirmation and tolerates the key already being absent.
    fn stop_run(&self, canonical_key: &str) {
        if let Some(entry) = self.registry.stop(canonical_key) {
            entry.handle.terminate();
            logging::log("RUN", &format!("Terminated: {}", canonical_key));
        }
    }

    // =========================================================================
    // External event reconciliation
    // =========================================================================

    /// An execution started, possibly by tooling outside this system.
    ///
    /// Executions of a foreign task kind are ignored. Known runs are left
    /// untouched (idempotent); unknown ones are adopted so they become
    /// visible and stoppable here.
    #[instrument(skip_all)]
    pub fn on_task_start(&self, execution: &Execution) -> Result<()> {
        let Some(canonical_key) = self.canonical_key_for(&execution.definition) else {
            return Ok(());
        };

        let entry = RunEntry::new(execution.handle.clone(), RunOrigin::External);
        if self.registry.adopt(&canonical_key, entry) {
            logging::log("RUN", &format!("Detected external start: {}", canonical_key));
        }

        self.history.lock().add(&canonical_key)?;
        self.refresh_views();
        Ok(())
    }

    /// An execution ended. Removes the matching entry when present; the
    /// end of a run this system was never tracking is a no-op.
    #[instrument(skip_all, fields(exit_code = exit_code))]
    pub fn on_task_end(&self, execution: &Execution, exit_code: i32) {
        let Some(canonical_key) = self.canonical_key_for(&execution.definition) else {
            return;
        };

        if self.registry.stop(&canonical_key).is_some() {
            logging::log(
                "RUN",
                &format!("Task finished: {} (exit_code={})", canonical_key, exit_code),
            );
        }
        self.refresh_views();
    }

    /// Canonical key for an engine execution, or None when the execution
    /// is not one of ours. A missing path defaults to the workspace root.
    fn canonical_key_for(&self, definition: &TaskDefinition) -> Option<String> {
        if !definition.is_package_script() {
            return None;
        }
        let script = definition.script.clone()?;
        let dir = definition
            .path
            .clone()
            .unwrap_or_else(|| self.workspace_root.clone());
        Some(
            RunKey::new(dir, script)
                .canonical(&self.workspace_root)
                .encode(),
        )
    }

    // =========================================================================
    // History commands
    // =========================================================================

    /// Remove one row from the history list. A run in progress under that
    /// key keeps running; only the row disappears.
    pub fn delete_history_item(&self, raw_key: &str) -> Result<()> {
        let canonical_key = self
            .canonicalize_raw(raw_key)
            .unwrap_or_else(|| raw_key.to_string());
        self.history.lock().remove(&canonical_key)?;
        self.refresh_views();
        Ok(())
    }

    /// Empty the history list. Running scripts keep running; they just
    /// drop off the visible history.
    pub fn reset_history(&self) -> Result<()> {
        self.history.lock().clear()?;
        self.refresh_views();
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Derive the unified view from current history + registry state
    pub fn compute_view(&self) -> ViewModel {
        let rows = {
            let history = self.history.lock();
            view::compute_rows(history.entries(), &self.registry, &self.workspace_root)
        };
        ViewModel {
            rows,
            running_indicator: RunIndicator::from_config(&self.config.read()),
        }
    }

    /// Recompute and push the unified view to every surface
    pub fn refresh_views(&self) {
        let view = self.compute_view();
        for surface in self.surfaces.read().iter() {
            surface.render(&view);
        }
    }

    /// Terminate every tracked run. Deactivation only.
    pub fn terminate_all(&self) {
        let count = self.registry.terminate_all();
        if count > 0 {
            info!(count = count, "Terminated all runs at shutdown");
        }
    }

    fn canonicalize_raw(&self, raw: &str) -> Option<String> {
        RunKey::decode(raw).map(|key| key.canonical(&self.workspace_root).encode())
    }
}
