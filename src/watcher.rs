//! Watches the config file for changes and emits debounced reload events.
//!
//! Rapid successions of filesystem events (editors write + rename) collapse
//! into a single reload per 500 ms window.

use notify::{recommended_watcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Event emitted when config needs to be reloaded
#[derive(Debug, Clone)]
pub enum ConfigReloadEvent {
    Reload,
}

/// Watches a config file for changes and emits [`ConfigReloadEvent`]s
pub struct ConfigWatcher {
    config_path: PathBuf,
    tx: Option<Sender<ConfigReloadEvent>>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher for the given config file.
    ///
    /// Returns a tuple of (watcher, receiver); the receiver yields one
    /// `Reload` per debounce window once `start` has been called.
    pub fn new(config_path: PathBuf) -> (Self, Receiver<ConfigReloadEvent>) {
        let (tx, rx) = channel();
        let watcher = ConfigWatcher {
            config_path,
            tx: Some(tx),
            watcher_thread: None,
        };
        (watcher, rx)
    }

    /// Start watching the config file for changes.
    ///
    /// Spawns a background thread that watches the file's parent directory
    /// and sends reload events through the receiver.
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;
        let config_path = self.config_path.clone();

        let thread_handle = thread::spawn(move || {
            if let Err(e) = Self::watch_loop(config_path, tx) {
                warn!(error = %e, watcher = "config", "Config watcher error");
            }
        });

        self.watcher_thread = Some(thread_handle);
        Ok(())
    }

    /// Internal watch loop running in background thread
    fn watch_loop(config_path: PathBuf, tx: Sender<ConfigReloadEvent>) -> NotifyResult<()> {
        let file_name = config_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();

        // Watch the parent directory: editors replace files by rename, and
        // watching the file inode directly loses track after the first save.
        let watch_path = config_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .to_path_buf();

        let debounce_active = Arc::new(Mutex::new(false));

        let (watch_tx, watch_rx) = channel();
        let mut watcher: Box<dyn Watcher> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                let _ = watch_tx.send(res);
            },
        )?);
        watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;

        info!(
            path = %watch_path.display(),
            target = %config_path.display(),
            "Config watcher started"
        );

        loop {
            match watch_rx.recv() {
                Ok(Ok(event)) => {
                    let is_config_change = event.paths.iter().any(|path: &PathBuf| {
                        path.file_name()
                            .map(|name| name == file_name.as_os_str())
                            .unwrap_or(false)
                    });
                    let is_relevant_event = matches!(
                        event.kind,
                        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                    );

                    if is_config_change && is_relevant_event {
                        let mut debounce = debounce_active.lock().unwrap();
                        if !*debounce {
                            *debounce = true;
                            drop(debounce);

                            let tx_clone = tx.clone();
                            let debounce_flag = debounce_active.clone();

                            thread::spawn(move || {
                                thread::sleep(RELOAD_DEBOUNCE);
                                let _ = tx_clone.send(ConfigReloadEvent::Reload);
                                let mut flag = debounce_flag.lock().unwrap();
                                *flag = false;
                                info!("Config file changed, emitting reload event");
                            });
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, watcher = "config", "File watcher error");
                }
                Err(_) => {
                    info!(watcher = "config", "Config watcher shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        // The watch thread parks on the notify channel; detach it rather
        // than join, so session teardown never blocks on a quiet watcher.
        drop(self.watcher_thread.take());
    }
}
