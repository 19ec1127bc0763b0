//! Session lifecycle and the user-facing commands.
//!
//! One [`Session`] per hosted workspace, explicitly constructed and torn
//! down: activation loads the persisted history and pushes the first view;
//! deactivation terminates every live run before discarding state. The
//! host's command bindings (toggle, reset-history, delete-history-item,
//! history-item-clicked) each map to one method here.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::config;
use crate::controller::RunController;
use crate::debounce::{ClickAction, ClickDebouncer};
use crate::engine::{EngineEvent, TaskEngine};
use crate::error::{Result, ResultExt};
use crate::history::StateStore;
use crate::logging;
use crate::watcher::{ConfigReloadEvent, ConfigWatcher};

/// One activated workspace: owns the controller, the click debouncer, and
/// the background pumps for engine events and config reloads.
pub struct Session {
    controller: Arc<RunController>,
    debouncer: Mutex<ClickDebouncer>,
    config_path: PathBuf,
    config_watcher: Option<ConfigWatcher>,
    event_pump: Option<thread::JoinHandle<()>>,
    reload_pump: Option<thread::JoinHandle<()>>,
    active: bool,
}

impl Session {
    /// Build a session with the default config location
    pub fn new(
        workspace_root: PathBuf,
        engine: Arc<dyn TaskEngine>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self::with_config_path(workspace_root, engine, store, config::default_config_path())
    }

    /// Build a session reading config from an explicit path
    pub fn with_config_path(
        workspace_root: PathBuf,
        engine: Arc<dyn TaskEngine>,
        store: Arc<dyn StateStore>,
        config_path: PathBuf,
    ) -> Self {
        let loaded = config::load_config(&config_path);
        Session {
            controller: Arc::new(RunController::new(workspace_root, engine, store, loaded)),
            debouncer: Mutex::new(ClickDebouncer::new()),
            config_path,
            config_watcher: None,
            event_pump: None,
            reload_pump: None,
            active: false,
        }
    }

    pub fn controller(&self) -> &Arc<RunController> {
        &self.controller
    }

    /// Load persisted state and push the first view
    #[instrument(skip(self))]
    pub fn activate(&mut self) {
        self.controller.load_history();
        self.controller.refresh_views();
        self.active = true;
        logging::log("SESSION", "Session activated");
    }

    /// Route the engine's event stream into the controller.
    ///
    /// Spawns a pump thread that runs until the engine's sender side is
    /// dropped.
    pub fn attach_engine_events(&mut self, events: Receiver<EngineEvent>) {
        let controller = self.controller.clone();
        self.event_pump = Some(thread::spawn(move || {
            for event in events {
                match event {
                    EngineEvent::ProcessStart(execution) => {
                        controller.on_task_start(&execution).log_err();
                    }
                    EngineEvent::ProcessEnd(execution, exit_code) => {
                        controller.on_task_end(&execution, exit_code);
                    }
                }
            }
            info!("Engine event pump stopped");
        }));
    }

    /// Start watching the config file; each debounced change reloads the
    /// config and recomputes the views. Watch failures are logged and the
    /// session continues without live reload.
    pub fn watch_config(&mut self) {
        let (mut watcher, reloads) = ConfigWatcher::new(self.config_path.clone());
        if let Err(e) = watcher.start() {
            warn!(error = %e, path = %self.config_path.display(), "Config watcher unavailable");
            return;
        }

        let controller = self.controller.clone();
        let config_path = self.config_path.clone();
        self.reload_pump = Some(thread::spawn(move || {
            for ConfigReloadEvent::Reload in reloads {
                controller.update_config(config::load_config(&config_path));
            }
        }));
        self.config_watcher = Some(watcher);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// `toggle(key)`: the button-bar activation. No debounce.
    pub fn toggle(&self, key: &str) -> Result<()> {
        self.controller.toggle(key)
    }

    /// `reset-history()`: clear the history list
    pub fn reset_history(&self) -> Result<()> {
        self.controller.reset_history()
    }

    /// `delete-history-item(key)`: remove one row, leaving any run alive
    pub fn delete_history_item(&self, key: &str) -> Result<()> {
        self.controller.delete_history_item(key)
    }

    /// `history-item-clicked(key)`: tree rows toggle only on a confirmed
    /// double-click within the debounce window.
    pub fn history_item_clicked(&self, key: &str) -> Result<()> {
        self.history_item_clicked_at(key, Instant::now())
    }

    /// Clock-injectable variant of [`Self::history_item_clicked`]
    pub fn history_item_clicked_at(&self, key: &str, now: Instant) -> Result<()> {
        match self.debouncer.lock().register(key, now) {
            ClickAction::Start => self.toggle(key),
            ClickAction::WaitForSecondClick => Ok(()),
        }
    }

    /// Re-read the config file and recompute the views
    pub fn reload_config(&self) {
        self.controller
            .update_config(config::load_config(&self.config_path));
    }

    /// Terminate every live run and discard session state. Idempotent.
    #[instrument(skip(self))]
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.controller.terminate_all();
        self.config_watcher = None;
        drop(self.reload_pump.take());
        drop(self.event_pump.take());
        self.active = false;
        logging::log("SESSION", "Session deactivated");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.deactivate();
    }
}
