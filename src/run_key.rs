//! Composite run identity: one package directory plus one script name.
//!
//! The canonical string form `<dir>::<script>` is what the registry, the
//! history list, and the host's click events all carry. Directories are
//! normalized to absolute form before comparison so a key built from a
//! relative path collides with the equivalent absolute one.

use std::path::{Component, Path, PathBuf};

/// Separator between the package directory and the script name.
/// Directories or scripts containing `::` are unsupported.
pub const KEY_SEPARATOR: &str = "::";

/// Identity of one run: `(package_dir, script)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub package_dir: PathBuf,
    pub script: String,
}

impl RunKey {
    pub fn new(package_dir: impl Into<PathBuf>, script: impl Into<String>) -> Self {
        RunKey {
            package_dir: package_dir.into(),
            script: script.into(),
        }
    }

    /// Canonical string form: `<dir>::<script>`
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            self.package_dir.display(),
            KEY_SEPARATOR,
            self.script
        )
    }

    /// Split a canonical string on the first `::` occurrence.
    ///
    /// Returns None when no separator is present (a malformed key).
    pub fn decode(raw: &str) -> Option<RunKey> {
        let (dir, script) = raw.split_once(KEY_SEPARATOR)?;
        Some(RunKey::new(PathBuf::from(dir), script.to_string()))
    }

    /// Resolve the directory against the workspace root and clean it.
    ///
    /// The result is the key every registry and history operation uses;
    /// canonicalization happens once, before any lookup or mutation.
    pub fn canonical(&self, workspace_root: &Path) -> RunKey {
        RunKey {
            package_dir: normalize_path(&self.package_dir, workspace_root),
            script: self.script.clone(),
        }
    }

    /// Human display label: bare script name at the workspace root,
    /// `basename:script` for sub-packages.
    pub fn label(&self, workspace_root: &Path) -> String {
        let dir = normalize_path(&self.package_dir, workspace_root);
        if dir == normalize_path(workspace_root, workspace_root) {
            return self.script.clone();
        }
        match dir.file_name().and_then(|name| name.to_str()) {
            Some(base) => format!("{}:{}", base, self.script),
            None => self.script.clone(),
        }
    }

    /// Directory shown next to the label: relative to the workspace root
    /// with `/` separators (`.` for the root itself), or the absolute
    /// directory unchanged when outside the root or no root is set.
    pub fn relative_display(&self, workspace_root: Option<&Path>) -> String {
        let Some(root) = workspace_root else {
            return self.package_dir.display().to_string();
        };
        let dir = normalize_path(&self.package_dir, root);
        let root = normalize_path(root, root);
        match dir.strip_prefix(&root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => dir.display().to_string(),
        }
    }
}

/// Normalize a path to absolute, lexically cleaned form.
///
/// Relative paths resolve against `base`. `.` and `..` components are
/// folded without touching the filesystem, so keys for directories that no
/// longer exist still normalize consistently.
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
