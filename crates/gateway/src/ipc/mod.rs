// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane IPC listener.
//!
//! A UNIX domain socket accepting framed-JSON event streams from workers.
//! Frames are sequential JSON objects `{event, data}` with no delimiter;
//! each decoded event is dispatched on its own task so a slow handler never
//! stalls the reader.

pub mod events;

use std::collections::HashMap;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub type IpcHandler = Arc<dyn Fn(EventData) -> BoxFuture<'static, ()> + Send + Sync>;

/// One decoded IPC frame.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

pub struct IpcListener {
    socket_path: PathBuf,
    listener: Mutex<Option<UnixListener>>,
    handlers: RwLock<HashMap<String, IpcHandler>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl IpcListener {
    /// Bind the socket: any stale file is removed, the parent directory is
    /// created with 0755, and the socket itself is opened up to 0666 so
    /// unprivileged workers can dial it.
    pub fn bind(path: &Path) -> anyhow::Result<Arc<Self>> {
        if path.as_os_str().is_empty() {
            anyhow::bail!("IPC listener needs a socket path (config.ipc.path)");
        }
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o755)
                    .create(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("failed to bind IPC socket {}", path.display()))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
            .with_context(|| format!("failed to chmod IPC socket {}", path.display()))?;

        info!(path = %path.display(), "IPC socket listener bound");
        Ok(Arc::new(Self {
            socket_path: path.to_path_buf(),
            listener: Mutex::new(Some(listener)),
            handlers: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }))
    }

    pub fn register_handler(&self, event: &str, handler: IpcHandler) {
        self.handlers.write().insert(event.to_owned(), handler);
    }

    /// Run the accept loop until `stop`.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let Some(listener) = self.listener.lock().await.take() else {
            anyhow::bail!("IPC listener already started");
        };
        let ipc = Arc::clone(self);
        self.tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = ipc.cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                let conn_ipc = Arc::clone(&ipc);
                                ipc.tracker.spawn(async move {
                                    conn_ipc.handle_connection(stream).await;
                                });
                            }
                            Err(e) => {
                                debug!(err = %e, "IPC accept error");
                            }
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Close the listener, wait for in-flight handlers, unlink the socket.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        let _ = std::fs::remove_file(&self.socket_path);
        info!("IPC socket listener stopped");
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Read frames with a 30-second rolling idle deadline. A decode error
    /// aborts this connection only.
    async fn handle_connection(self: &Arc<Self>, mut stream: UnixStream) {
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return,
                read = tokio::time::timeout(IDLE_TIMEOUT, stream.read_buf(&mut buf)) => read,
            };
            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!(err = %e, "IPC read error");
                    return;
                }
                Err(_) => {
                    debug!("IPC connection idle deadline exceeded");
                    return;
                }
            };
            if n == 0 {
                return;
            }

            match drain_frames(&mut buf) {
                Ok(frames) => {
                    for frame in frames {
                        self.dispatch(frame);
                    }
                }
                Err(e) => {
                    warn!(err = %e, "IPC decode error, closing connection");
                    return;
                }
            }
        }
    }

    /// Run the handler for an event on a fresh task; panics are caught and
    /// logged, unknown events are dropped.
    fn dispatch(self: &Arc<Self>, frame: EventData) {
        let handler = self.handlers.read().get(&frame.event).cloned();
        let Some(handler) = handler else {
            warn!(event = %frame.event, "no handler registered for IPC event");
            return;
        };
        let event_name = frame.event.clone();
        let fut = handler(frame);
        self.tracker.spawn(async move {
            if let Err(e) = tokio::spawn(fut).await {
                if e.is_panic() {
                    error!(event = %event_name, "IPC event handler panicked");
                }
            }
        });
    }
}

/// Decode every complete JSON object at the front of `buf`, leaving any
/// partial frame in place for the next read.
pub(crate) fn drain_frames(buf: &mut Vec<u8>) -> Result<Vec<EventData>, serde_json::Error> {
    let mut frames = Vec::new();
    let mut consumed = 0usize;
    {
        let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<EventData>();
        loop {
            match stream.next() {
                Some(Ok(frame)) => {
                    consumed = stream.byte_offset();
                    frames.push(frame);
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(e),
                None => {
                    consumed = stream.byte_offset();
                    break;
                }
            }
        }
    }
    buf.drain(..consumed);
    Ok(frames)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
