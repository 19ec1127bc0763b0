//! Durable launch history: the ordered set of run keys the user has ever
//! launched.
//!
//! Insertion order is display order; duplicates are forbidden. The list is
//! the sole persisted record, stored under one fixed key in a workspace-
//! scoped [`StateStore`]. Every mutation persists before it reports
//! success, so a later load always reflects the most recent completed
//! write.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::logging;

/// Fixed key the history list is stored under
pub const HISTORY_STATE_KEY: &str = "scriptButtonsHistory";

/// Durable key-value store capability, scoped to the current workspace
pub trait StateStore: Send + Sync {
    /// Stored list for `key`, or None when nothing was persisted
    fn get(&self, key: &str) -> Option<Vec<String>>;
    /// Replace the stored list for `key`
    fn update(&self, key: &str, value: &[String]) -> anyhow::Result<()>;
}

/// Ordered, duplicate-free list of canonical run keys
pub struct HistoryStore {
    entries: Vec<String>,
    store: Arc<dyn StateStore>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        HistoryStore {
            entries: Vec::new(),
            store,
        }
    }

    /// Load the persisted list. Starts empty when nothing was stored.
    #[instrument(skip(self))]
    pub fn load(&mut self) {
        self.entries = self.store.get(HISTORY_STATE_KEY).unwrap_or_default();
        info!(entry_count = self.entries.len(), "Loaded run history");
    }

    /// Append `key` if absent, persisting on change.
    ///
    /// Returns whether the list changed. On a persistence failure the
    /// in-memory list is rolled back, so it only ever reflects completed
    /// writes.
    pub fn add(&mut self, key: &str) -> Result<bool> {
        if self.contains(key) {
            return Ok(false);
        }
        self.entries.push(key.to_string());
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }
        logging::log("HISTORY", &format!("Added to history: {}", key));
        Ok(true)
    }

    /// Remove `key` from the list, persisting on change
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if !self.contains(key) {
            return Ok(());
        }
        let previous = self.entries.clone();
        self.entries.retain(|entry| entry != key);
        if let Err(e) = self.persist() {
            self.entries = previous;
            return Err(e);
        }
        logging::log("HISTORY", &format!("Removed from history: {}", key));
        Ok(())
    }

    /// Replace the list with an empty one
    pub fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.entries);
        if let Err(e) = self.persist() {
            self.entries = previous;
            return Err(e);
        }
        logging::log("HISTORY", "History cleared");
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry == key)
    }

    /// Entries in insertion (display) order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn persist(&self) -> Result<()> {
        self.store
            .update(HISTORY_STATE_KEY, &self.entries)
            .map_err(Into::into)
    }
}

// =============================================================================
// JsonFileStore - file-backed StateStore
// =============================================================================

/// File-backed [`StateStore`]: one JSON object per workspace, written
/// atomically (temp file + rename) so readers never observe a partial
/// write.
pub struct JsonFileStore {
    file_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(file_path: PathBuf) -> Self {
        JsonFileStore { file_path }
    }

    fn read_all(&self) -> HashMap<String, Vec<String>> {
        if !self.file_path.exists() {
            return HashMap::new();
        }
        let content = match std::fs::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, path = %self.file_path.display(), "Failed to read state file");
                return HashMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, path = %self.file_path.display(), "Failed to parse state file");
                HashMap::new()
            }
        }
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Vec<String>> {
        self.read_all().remove(key)
    }

    fn update(&self, key: &str, value: &[String]) -> anyhow::Result<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), value.to_vec());

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string(&all).context("Failed to serialize state")?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write temp state file: {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &self.file_path).with_context(|| {
            format!("Failed to rename temp file to {}", self.file_path.display())
        })?;

        Ok(())
    }
}
