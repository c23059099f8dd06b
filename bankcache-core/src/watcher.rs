//! Change detection over the source bank directory.
//!
//! The OS watcher calls back on its own thread and only ever raises a flag;
//! the flag is consumed on the tick thread through [`ChangeSource::signal_changed`],
//! so any number of filesystem events between two ticks collapse into one signal.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

pub trait ChangeSource {
    /// Point the watcher at `root`, or at nothing. Must not fail.
    fn watch(&mut self, root: Option<&Path>);

    /// Whether anything changed since the last call. Clears the flag.
    fn signal_changed(&mut self) -> bool;

    /// Backstop for the periodic poll.
    fn root_exists(&self) -> bool;
}

/// Notify-backed [`ChangeSource`]. Degrades to poll-only when the watcher
/// cannot be attached.
pub struct ChangeDetector {
    root: Option<PathBuf>,
    changed: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    attach_failed: bool,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            root: None,
            changed: Arc::new(AtomicBool::new(false)),
            watcher: None,
            attach_failed: false,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// True when OS notifications are being delivered.
    pub fn is_attached(&self) -> bool {
        self.watcher.is_some()
    }

    fn attach(&self, root: &Path) -> notify::Result<RecommendedWatcher> {
        let flag = Arc::clone(&self.changed);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) || event.need_rescan()
                    {
                        flag.store(true, Ordering::Release);
                    }
                }
                // A watcher error may mean lost events; let the next tick look.
                Err(_) => flag.store(true, Ordering::Release),
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }
}

impl ChangeSource for ChangeDetector {
    fn watch(&mut self, root: Option<&Path>) {
        if self.root.as_deref() == root {
            // Same root: only retry when it has appeared since the last attempt.
            let retry = self.watcher.is_none()
                && !self.attach_failed
                && root.map_or(false, Path::is_dir);
            if !retry {
                return;
            }
        }

        // Stop delivery before moving the watch.
        self.watcher = None;
        self.attach_failed = false;
        self.changed.store(false, Ordering::Release);
        self.root = root.map(Path::to_path_buf);

        let root = match root {
            Some(root) if root.is_dir() => root,
            Some(root) => {
                log::debug!(target: "bankcache::watcher", "{} does not exist; nothing to watch", root.display());
                return;
            }
            None => return,
        };

        match self.attach(root) {
            Ok(watcher) => {
                log::debug!(target: "bankcache::watcher", "watching {}", root.display());
                self.watcher = Some(watcher);
            }
            Err(e) => {
                self.attach_failed = true;
                log::warn!(target: "bankcache::watcher", "Error watching {}: {}; falling back to polling", root.display(), e);
            }
        }
    }

    fn signal_changed(&mut self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    fn root_exists(&self) -> bool {
        self.root.as_deref().map_or(false, Path::is_dir)
    }
}
