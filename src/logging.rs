//! Structured JSONL logging plus the activity feed shown by the host.
//!
//! Dual-output logging:
//! - **JSONL to file** (~/.script-buttons/logs/script-buttons.jsonl) - structured, append-only
//! - **Pretty to stderr** - human-readable for developers
//!
//! The host editor also displays a plain-text activity feed (launches,
//! terminations, history changes). [`log`] mirrors each line into a bounded
//! in-memory buffer that the host drains via [`recent_activity`].

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static ACTIVITY_BUFFER: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();
const MAX_ACTIVITY_LINES: usize = 200;

/// Guard that must be kept alive for the duration of the session.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the dual-output logging system.
///
/// Returns a guard that MUST be kept alive for the duration of the session.
/// Dropping the guard will flush remaining logs and close the file.
pub fn init() -> LoggingGuard {
    let _ = ACTIVITY_BUFFER.set(Mutex::new(VecDeque::with_capacity(MAX_ACTIVITY_LINES)));

    let log_dir = log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }

    let log_path = log_dir.join("script-buttons.jsonl");

    // Open log file with append mode
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|e| {
            eprintln!("[LOGGING] Failed to open log file: {}", e);
            OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .expect("Failed to open /dev/null")
        });

    // Non-blocking writer so slow disks never stall the host
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);

    // Environment filter - default to info, allow override via RUST_LOG
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,notify=warn"));

    let json_layer = fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE);

    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    tracing::info!(
        event_type = "session_lifecycle",
        action = "logging_initialized",
        log_path = %log_path.display(),
        "Script Buttons logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Get the log directory path (~/.script-buttons/logs/)
fn log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".script-buttons").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("script-buttons-logs"))
}

/// Get the path to the JSONL log file
pub fn log_path() -> PathBuf {
    log_dir().join("script-buttons.jsonl")
}

/// Log one activity line (a launch, a termination, a history change).
///
/// Mirrors into the bounded activity buffer and into tracing. Prefer the
/// tracing macros directly for anything with structured fields.
pub fn log(category: &str, message: &str) {
    add_to_buffer(category, message);
    tracing::info!(category = category, activity = true, "{}", message);
}

/// Add a line to the in-memory activity buffer
fn add_to_buffer(category: &str, message: &str) {
    if let Some(buffer) = ACTIVITY_BUFFER.get() {
        if let Ok(mut buf) = buffer.lock() {
            if buf.len() >= MAX_ACTIVITY_LINES {
                buf.pop_front();
            }
            buf.push_back(format!(
                "[{}] [{}] {}",
                Utc::now().to_rfc3339(),
                category,
                message
            ));
        }
    }
}

/// Recent activity lines, oldest first, for the host's activity feed
pub fn recent_activity() -> Vec<String> {
    if let Some(buffer) = ACTIVITY_BUFFER.get() {
        if let Ok(buf) = buffer.lock() {
            return buf.iter().cloned().collect();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_buffer_keeps_most_recent_lines() {
        let _ = ACTIVITY_BUFFER.set(Mutex::new(VecDeque::with_capacity(MAX_ACTIVITY_LINES)));

        for i in 0..(MAX_ACTIVITY_LINES + 10) {
            add_to_buffer("TEST", &format!("line {}", i));
        }
        add_to_buffer("TEST", "final-marker");

        let lines = recent_activity();
        assert_eq!(lines.len(), MAX_ACTIVITY_LINES);
        assert!(lines.iter().any(|l| l.contains("final-marker")));
    }
}
