//! Derived view state for both UI surfaces.
//!
//! One row per history entry, computed from the history list and the run
//! registry. The button bar and the history tree are rebuilt from the same
//! sequence on every refresh, so they can never disagree about what is
//! running.

use std::path::Path;

use tracing::warn;

use crate::config::Config;
use crate::registry::RunRegistry;
use crate::run_key::RunKey;

/// One visible run control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Canonical run key, carried back on click events
    pub key: String,
    /// Display label: `script` or `basename:script`
    pub label: String,
    /// Package directory relative to the workspace root
    pub relative_path: String,
    pub is_running: bool,
}

/// Glyph shown next to a running row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunIndicator {
    /// Spinner animation
    Animated,
    /// Static stopped-square
    StaticSquare,
}

impl RunIndicator {
    pub fn from_config(config: &Config) -> Self {
        if config.spin_icon {
            RunIndicator::Animated
        } else {
            RunIndicator::StaticSquare
        }
    }
}

/// Everything a surface needs to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub rows: Vec<Row>,
    pub running_indicator: RunIndicator,
}

/// Render target capability; both the button bar and the history tree
/// implement this and receive every refresh.
pub trait ViewSurface: Send + Sync {
    fn render(&self, view: &ViewModel);
}

/// Compute the row sequence for the current history and registry state.
///
/// Pure function of its inputs. Keys that fail to decode (no `::`) are
/// logged and skipped rather than rendered blank.
pub fn compute_rows(
    history: &[String],
    registry: &RunRegistry,
    workspace_root: &Path,
) -> Vec<Row> {
    history
        .iter()
        .filter_map(|raw| {
            let Some(key) = RunKey::decode(raw) else {
                warn!(key = raw.as_str(), "Skipping malformed history key");
                return None;
            };
            Some(Row {
                key: raw.clone(),
                label: key.label(workspace_root),
                relative_path: key.relative_display(Some(workspace_root)),
                is_running: registry.is_running(raw),
            })
        })
        .collect()
}
