//! Package-manager detection for a package directory.
//!
//! Walks upward from the package directory to the workspace root looking
//! for lockfiles, falling back to the manifest's `packageManager` field,
//! and finally to npm. Detection never fails and is recomputed on every
//! launch, since lockfiles can change between runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::ScriptButtonsError;
use crate::run_key::normalize_path;

/// The four supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

/// Lockfiles in detection priority order
const LOCKFILES: &[(&str, PackageManager)] = &[
    ("yarn.lock", PackageManager::Yarn),
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("bun.lockb", PackageManager::Bun),
    ("bun.lock", PackageManager::Bun),
    ("package-lock.json", PackageManager::Npm),
];

const MANIFEST_FILE: &str = "package.json";

impl PackageManager {
    /// Name of the command-line binary
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    /// Full command line that runs `script` with this manager
    pub fn run_command(&self, script: &str) -> String {
        match self {
            PackageManager::Npm => format!("npm run {}", script),
            PackageManager::Yarn => format!("yarn {}", script),
            PackageManager::Pnpm => format!("pnpm run {}", script),
            PackageManager::Bun => format!("bun run {}", script),
        }
    }

    /// Match a manifest `packageManager` value like `"pnpm@8.6.0"`.
    ///
    /// yarn/pnpm/bun are checked before npm so the bare prefixes can't
    /// shadow each other.
    fn from_manager_field(value: &str) -> Option<Self> {
        const KNOWN: &[(&str, PackageManager)] = &[
            ("yarn", PackageManager::Yarn),
            ("pnpm", PackageManager::Pnpm),
            ("bun", PackageManager::Bun),
            ("npm", PackageManager::Npm),
        ];
        KNOWN
            .iter()
            .find(|(name, _)| value.starts_with(name))
            .map(|(_, kind)| *kind)
    }
}

/// The slice of `package.json` detection cares about
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    package_manager: Option<String>,
}

/// Detect which package manager owns the given directory.
///
/// Walks from `dir` upward to (and including) `workspace_root`:
/// a lockfile decides immediately, then the manifest's `packageManager`
/// field, then the walk moves to the parent. Stops at the workspace root
/// or the filesystem root, whichever comes first. Read or parse failures
/// at any single level are logged and the walk continues. Always returns
/// a kind; the fallback is npm.
#[instrument(skip(workspace_root), fields(root = %workspace_root.display()))]
pub fn detect(dir: &Path, workspace_root: &Path) -> PackageManager {
    let root = normalize_path(workspace_root, workspace_root);
    let mut current = normalize_path(dir, &root);

    loop {
        match detect_in_directory(&current) {
            Ok(Some(kind)) => {
                debug!(dir = %current.display(), kind = kind.binary(), "Package manager detected");
                return kind;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, dir = %current.display(), "Detection step failed, continuing upward");
            }
        }

        if current == root {
            break;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    debug!(dir = %dir.display(), "No package manager markers found, defaulting to npm");
    PackageManager::Npm
}

/// One level of the walk: lockfiles first, then the manifest field.
fn detect_in_directory(dir: &Path) -> Result<Option<PackageManager>, ScriptButtonsError> {
    let entries = list_entry_names(dir).map_err(|e| ScriptButtonsError::Detection {
        dir: dir.to_path_buf(),
        source: e,
    })?;

    for (lockfile, kind) in LOCKFILES {
        if entries.contains(*lockfile) {
            return Ok(Some(*kind));
        }
    }

    if entries.contains(MANIFEST_FILE) {
        let manifest =
            read_manifest(&dir.join(MANIFEST_FILE)).map_err(|e| ScriptButtonsError::Detection {
                dir: dir.to_path_buf(),
                source: e,
            })?;
        if let Some(field) = manifest.package_manager.as_deref() {
            return Ok(PackageManager::from_manager_field(field));
        }
    }

    Ok(None)
}

fn list_entry_names(dir: &Path) -> anyhow::Result<HashSet<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;
    let mut names = HashSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn read_manifest(path: &PathBuf) -> anyhow::Result<PackageManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}
