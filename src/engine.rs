//! Task-engine capability: the external subsystem that actually spawns and
//! supervises script processes.
//!
//! The core only sees [`TaskEngine::start`], opaque [`ExecutionHandle`]s,
//! and the [`EngineEvent`] stream. [`ShellEngine`] is the process-backed
//! default: it spawns each command in its own Unix process group so a
//! terminate request takes the whole child tree down, and a monitor thread
//! reports the exit code when the process ends on its own.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::error::{Result, ScriptButtonsError};
use crate::logging;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Task kind this system owns; executions with other kinds are ignored.
pub const TASK_KIND: &str = "npm";

/// Typed task definition, validated at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub kind: String,
    pub script: Option<String>,
    pub path: Option<PathBuf>,
}

impl TaskDefinition {
    /// Definition for a package script launched from `path`
    pub fn package_script(script: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        TaskDefinition {
            kind: TASK_KIND.to_string(),
            script: Some(script.into()),
            path: Some(path.into()),
        }
    }

    /// Whether this execution belongs to this system: our task kind,
    /// with a script name attached.
    pub fn is_package_script(&self) -> bool {
        self.kind == TASK_KIND && self.script.is_some()
    }
}

/// Everything the engine needs to launch one run
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub definition: TaskDefinition,
    /// Full command line, e.g. `yarn build`
    pub command: String,
    /// Working directory for the process
    pub cwd: PathBuf,
}

/// Live handle to a running execution. The engine owns the process; the
/// registry holds a non-owning reference and only ever asks to terminate.
pub trait ExecutionHandle: Send + Sync + std::fmt::Debug {
    /// Best-effort termination request. Idempotent.
    fn terminate(&self);
}

/// One observed execution: its definition plus the live handle
#[derive(Debug, Clone)]
pub struct Execution {
    pub definition: TaskDefinition,
    pub handle: Arc<dyn ExecutionHandle>,
}

/// Events the engine reports about executions it supervises
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A process started (self-initiated or by unrelated tooling)
    ProcessStart(Execution),
    /// A process ended, with its exit code
    ProcessEnd(Execution, i32),
}

/// Capability the controller consumes to launch runs
pub trait TaskEngine: Send + Sync {
    /// Launch the given task. Returns the live handle on success; the
    /// engine reports the matching `ProcessStart`/`ProcessEnd` events on
    /// its event stream.
    fn start(&self, spec: TaskSpec) -> Result<Arc<dyn ExecutionHandle>>;
}

// =============================================================================
// ShellEngine - process-backed default implementation
// =============================================================================

/// Process-backed [`TaskEngine`] using `std::process::Command`
pub struct ShellEngine {
    events: Sender<EngineEvent>,
}

impl ShellEngine {
    /// Create an engine that reports events on the given channel
    pub fn new(events: Sender<EngineEvent>) -> Self {
        ShellEngine { events }
    }
}

impl TaskEngine for ShellEngine {
    #[instrument(skip(self), fields(command = %spec.command, cwd = %spec.cwd.display()))]
    fn start(&self, spec: TaskSpec) -> Result<Arc<dyn ExecutionHandle>> {
        let mut parts = spec.command.split_whitespace();
        let program = parts.next().ok_or_else(|| ScriptButtonsError::EngineStart {
            command: spec.command.clone(),
            message: "empty command line".to_string(),
        })?;
        let args: Vec<&str> = parts.collect();

        let executable = resolve_executable(program);
        debug!(executable = %executable.display(), args = ?args, "Spawning script process");

        let mut command = Command::new(&executable);
        command
            .args(&args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null());

        // On Unix, spawn in a new process group so we can kill all children.
        // process_group(0) means the child's PID becomes the PGID.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            error!(error = %e, executable = %executable.display(), "Process spawn failed");
            ScriptButtonsError::EngineStart {
                command: spec.command.clone(),
                message: e.to_string(),
            }
        })?;

        let pid = child.id();
        info!(pid = pid, pgid = pid, command = %spec.command, "Process spawned");
        logging::log(
            "ENGINE",
            &format!("Spawned '{}' with PID {}", spec.command, pid),
        );

        let handle: Arc<dyn ExecutionHandle> = Arc::new(ShellExecutionHandle {
            pid,
            killed: AtomicBool::new(false),
        });
        let execution = Execution {
            definition: spec.definition,
            handle: handle.clone(),
        };

        let _ = self.events.send(EngineEvent::ProcessStart(execution.clone()));

        // Monitor thread: wait for natural process end and report the code
        let events = self.events.clone();
        thread::spawn(move || {
            let exit_code = match child.wait() {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    error!(error = %e, pid = pid, "Failed to wait for child process");
                    -1
                }
            };
            debug!(pid = pid, exit_code = exit_code, "Process ended");
            let _ = events.send(EngineEvent::ProcessEnd(execution, exit_code));
        });

        Ok(handle)
    }
}

/// Handle to one spawned process group
#[derive(Debug)]
struct ShellExecutionHandle {
    /// Process ID (also the PGID since we spawn with process_group(0))
    pid: u32,
    killed: AtomicBool,
}

impl ExecutionHandle for ShellExecutionHandle {
    fn terminate(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            debug!(pid = self.pid, "Process already terminated, skipping");
            return;
        }

        #[cfg(unix)]
        {
            // Kill the entire process group using the kill command with a
            // negative PID; the PGID equals the PID.
            let negative_pgid = format!("-{}", self.pid);
            match Command::new("kill").args(["-9", &negative_pgid]).output() {
                Ok(output) => {
                    if output.status.success() {
                        logging::log("ENGINE", &format!("Killed process group {}", self.pid));
                    } else {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        if stderr.contains("No such process") {
                            debug!(pid = self.pid, "Process group already exited");
                        } else {
                            error!(pid = self.pid, stderr = %stderr, "kill command failed");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, pid = self.pid, "Failed to execute kill command");
                }
            }
        }

        #[cfg(not(unix))]
        {
            logging::log(
                "ENGINE",
                &format!("Non-Unix platform: cannot kill process {}", self.pid),
            );
        }
    }
}

/// Find an executable, checking PATH first and then common install
/// locations that GUI hosts miss.
fn resolve_executable(name: &str) -> PathBuf {
    if let Ok(found) = which::which(name) {
        return found;
    }

    let common_paths = [
        dirs::home_dir().map(|h| h.join(".bun/bin")),
        dirs::home_dir().map(|h| h.join("Library/pnpm")),
        dirs::home_dir().map(|h| h.join(".nvm/current/bin")),
        dirs::home_dir().map(|h| h.join(".volta/bin")),
        dirs::home_dir().map(|h| h.join(".local/bin")),
        Some(PathBuf::from("/opt/homebrew/bin")),
        Some(PathBuf::from("/usr/local/bin")),
        Some(PathBuf::from("/usr/bin")),
        Some(PathBuf::from("/bin")),
    ];

    for path in common_paths.iter().flatten() {
        let candidate = path.join(name);
        if candidate.exists() {
            debug!(executable = %candidate.display(), "Found executable in common location");
            return candidate;
        }
    }

    // Let spawn report the failure with the bare name
    PathBuf::from(name)
}
