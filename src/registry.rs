//! Live-run registry: the single source of truth for "is this running".
//!
//! Maps canonical run-key strings to the execution handles currently
//! associated with them. A key present here is running; absence means not
//! running, even when the key still appears in the history list.
//! Check-and-insert happens under one lock, so at most one handle can ever
//! be registered per key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::ExecutionHandle;
use crate::error::{Result, ScriptButtonsError};
use crate::logging;

/// How a registry entry came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrigin {
    /// Launched through this system's own toggle
    SelfStarted,
    /// Observed from the engine's event stream, started by other tooling
    External,
}

/// One tracked run
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub handle: Arc<dyn ExecutionHandle>,
    pub started_at: DateTime<Utc>,
    pub origin: RunOrigin,
}

impl RunEntry {
    pub fn new(handle: Arc<dyn ExecutionHandle>, origin: RunOrigin) -> Self {
        RunEntry {
            handle,
            started_at: Utc::now(),
            origin,
        }
    }
}

/// Registry of currently-running executions keyed by canonical run key
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        RunRegistry {
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a run is currently registered under this key
    pub fn is_running(&self, key: &str) -> bool {
        self.runs.lock().contains_key(key)
    }

    /// Record a run under `key`. Fails with `AlreadyRunning` when the key
    /// is occupied; the check and the insert are one critical section, so
    /// a lost race can never overwrite a live handle.
    pub fn start(&self, key: &str, entry: RunEntry) -> Result<()> {
        let mut runs = self.runs.lock();
        if runs.contains_key(key) {
            return Err(ScriptButtonsError::AlreadyRunning {
                key: key.to_string(),
            });
        }
        debug!(key = key, origin = ?entry.origin, "Registering run");
        runs.insert(key.to_string(), entry);
        Ok(())
    }

    /// Insert `entry` only when `key` is vacant. Used for externally
    /// observed runs, where an occupied key means state is already
    /// consistent. Returns whether the entry was inserted.
    pub fn adopt(&self, key: &str, entry: RunEntry) -> bool {
        let mut runs = self.runs.lock();
        if runs.contains_key(key) {
            return false;
        }
        debug!(key = key, origin = ?entry.origin, "Adopting run");
        runs.insert(key.to_string(), entry);
        true
    }

    /// Whether the entry under `key` holds this exact handle
    pub fn handle_matches(&self, key: &str, handle: &Arc<dyn ExecutionHandle>) -> bool {
        self.runs
            .lock()
            .get(key)
            .map(|entry| Arc::ptr_eq(&entry.handle, handle))
            .unwrap_or(false)
    }

    /// Remove and return the entry for `key`. Idempotent: absent keys
    /// return None.
    pub fn stop(&self, key: &str) -> Option<RunEntry> {
        let removed = self.runs.lock().remove(key);
        if removed.is_some() {
            debug!(key = key, "Unregistered run");
        }
        removed
    }

    /// Keys of every currently tracked run
    pub fn running_keys(&self) -> Vec<String> {
        self.runs.lock().keys().cloned().collect()
    }

    /// Number of currently tracked runs
    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }

    /// Terminate every live handle, then clear the map. Shutdown only.
    ///
    /// Returns the number of runs that were terminated.
    pub fn terminate_all(&self) -> usize {
        let entries: Vec<(String, RunEntry)> = self.runs.lock().drain().collect();
        if entries.is_empty() {
            return 0;
        }

        info!(count = entries.len(), "Terminating all tracked runs");
        for (key, entry) in &entries {
            logging::log("RUN", &format!("Terminating at shutdown: {}", key));
            entry.handle.terminate();
        }
        entries.len()
    }
}
