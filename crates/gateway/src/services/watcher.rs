// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot-reload file watching for a worker's source tree.
//!
//! Write events are debounced into restart requests on a bounded channel;
//! a burst of edits collapses to a single restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const RESTART_QUEUE_DEPTH: usize = 16;

/// Handle to a live watcher. Dropping or closing it stops the debounce task;
/// the notify backend is released with the handle.
pub struct ServiceWatcher {
    cancel: CancellationToken,
    _watcher: notify::RecommendedWatcher,
}

impl ServiceWatcher {
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Watch `cwd` recursively (minus `node_modules`) and deliver debounced
/// restart requests on `restart_tx`.
pub fn watch(
    cwd: &Path,
    restart_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) -> anyhow::Result<ServiceWatcher> {
    let (wake_tx, wake_rx) = mpsc::channel::<()>(64);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        if !is_write_event(&event.kind) {
            return;
        }
        if event.paths.iter().all(|p| is_ignored_path(p)) {
            return;
        }
        let _ = wake_tx.try_send(());
    })?;

    for dir in watchable_dirs(cwd) {
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            debug!(dir = %dir.display(), err = %e, "failed to watch directory");
        }
    }

    tokio::spawn(debounce_loop(wake_rx, restart_tx, cancel.clone(), DEBOUNCE_WINDOW));

    Ok(ServiceWatcher { cancel, _watcher: watcher })
}

/// Coalesce wake events into one restart request per quiet window.
pub(crate) async fn debounce_loop(
    mut wake_rx: mpsc::Receiver<()>,
    restart_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    window: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            wake = wake_rx.recv() => {
                if wake.is_none() {
                    return;
                }
            }
        }

        let deadline = tokio::time::Instant::now() + window;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => break,
                more = wake_rx.recv() => {
                    if more.is_none() {
                        break;
                    }
                }
            }
        }

        if restart_tx.try_send(()).is_err() {
            // Queue full: a pending restart already covers this burst.
            debug!("restart request dropped, one already pending");
        }
    }
}

fn is_write_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_))
}

/// Every directory under `root` (inclusive), skipping `node_modules` trees.
fn watchable_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if dir.components().any(|c| c.as_os_str() == "node_modules") {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            }
        }
        dirs.push(dir);
    }
    dirs
}

/// Dotfiles, editor temp files, and anything under `node_modules` never
/// trigger a reload.
pub(crate) fn is_ignored_path(path: &Path) -> bool {
    if path.components().any(|c| c.as_os_str() == "node_modules") {
        return true;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    name.starts_with('.')
        || name.ends_with('~')
        || name.ends_with(".tmp")
        || name.ends_with(".swp")
        || name.ends_with(".swx")
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
