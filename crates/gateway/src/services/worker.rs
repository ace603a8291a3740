// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single supervised worker process.
//!
//! Each worker owns at most one live child at a time. A monotonically
//! increasing epoch guards the monitor task against acting on a child it no
//! longer owns after a restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use futures_util::future::BoxFuture;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::proxy::unix::WorkerSocketClient;
use crate::services::watcher::ServiceWatcher;

pub const MIN_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

const STOP_SOFT_GRACE: Duration = Duration::from_secs(2);
const STOP_DONE_WAIT: Duration = Duration::from_secs(3);
const RESTART_SOFT_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
}

/// Crash back-off for the next scheduled restart.
pub fn crash_backoff(crash_count: u32) -> Duration {
    let factor = 1u32 << crash_count.min(5);
    MIN_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}

struct WorkerRuntime {
    state: WorkerState,
    pid: Option<u32>,
    epoch: u64,
    listen_socket: Option<PathBuf>,
    socket_client: Option<Arc<WorkerSocketClient>>,
    crash_count: u32,
    last_crash_at: Option<Instant>,
    intentional_stop: bool,
    skip_next_restart: bool,
    restart_requested: bool,
    watcher: Option<ServiceWatcher>,
}

pub struct Worker {
    pub id: String,
    pub main_path: PathBuf,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub bootloader: PathBuf,
    color: &'static str,
    auto_restart: bool,
    cancel: CancellationToken,
    state: Mutex<WorkerRuntime>,
    /// Bumped once per child exit; `stop` waits on it.
    done_tx: watch::Sender<u64>,
}

pub struct WorkerOptions {
    pub id: String,
    pub main_path: PathBuf,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub bootloader: PathBuf,
    pub auto_restart: bool,
    pub cancel: CancellationToken,
}

impl Worker {
    pub fn new(options: WorkerOptions) -> Arc<Self> {
        let (done_tx, _) = watch::channel(0u64);
        Arc::new(Self {
            color: color_for(&options.id),
            id: options.id,
            main_path: options.main_path,
            cwd: options.cwd,
            env: options.env,
            bootloader: options.bootloader,
            auto_restart: options.auto_restart,
            cancel: options.cancel,
            state: Mutex::new(WorkerRuntime {
                state: WorkerState::Idle,
                pid: None,
                epoch: 0,
                listen_socket: None,
                socket_client: None,
                crash_count: 0,
                last_crash_at: None,
                intentional_stop: false,
                skip_next_restart: false,
                restart_requested: false,
                watcher: None,
            }),
            done_tx,
        })
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn state(&self) -> WorkerState {
        self.state.lock().await.state
    }

    pub async fn pid(&self) -> Option<u32> {
        self.state.lock().await.pid
    }

    pub async fn crash_count(&self) -> u32 {
        self.state.lock().await.crash_count
    }

    pub async fn listen_socket(&self) -> Option<PathBuf> {
        self.state.lock().await.listen_socket.clone()
    }

    pub async fn socket_client(&self) -> Option<Arc<WorkerSocketClient>> {
        self.state.lock().await.socket_client.clone()
    }

    /// Bind the worker's listen socket and open its client pool.
    pub async fn set_listen_socket(&self, socket: PathBuf) {
        let mut rt = self.state.lock().await;
        if rt.listen_socket.as_deref() == Some(socket.as_path()) && rt.socket_client.is_some() {
            return;
        }
        rt.socket_client = Some(Arc::new(WorkerSocketClient::new(socket.clone())));
        rt.listen_socket = Some(socket);
    }

    pub async fn attach_watcher(&self, watcher: ServiceWatcher) {
        let mut rt = self.state.lock().await;
        rt.watcher = Some(watcher);
    }

    /// Spawn the child process and its monitor.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let (child, epoch) = {
            let mut rt = self.state.lock().await;
            if matches!(rt.state, WorkerState::Starting | WorkerState::Running) {
                return Ok(());
            }
            rt.state = WorkerState::Starting;
            rt.intentional_stop = false;
            rt.epoch += 1;
            let epoch = rt.epoch;

            let mut cmd = Command::new(&self.bootloader);
            cmd.arg(&self.main_path)
                .current_dir(&self.cwd)
                .env_clear()
                .envs(&self.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    rt.state = WorkerState::Idle;
                    return Err(e).with_context(|| {
                        format!("failed to spawn worker [{}] via {}", self.id, self.bootloader.display())
                    });
                }
            };
            rt.pid = child.id();
            rt.state = WorkerState::Running;
            (child, epoch)
        };

        info!(worker = %self.id, pid = child.id(), main = %self.main_path.display(), "worker started");

        let mut child = child;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_prefixed(stdout, self.id.clone(), self.color, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_prefixed(stderr, self.id.clone(), self.color, true));
        }

        tokio::spawn(Arc::clone(self).monitor(child, epoch));
        Ok(())
    }

    /// Watch the child until it exits, then decide what happens next.
    fn monitor(self: Arc<Self>, mut child: Child, epoch: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = self.cancel.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let clean = status.as_ref().map(|s| s.success()).unwrap_or(false);

            let mut rt = self.state.lock().await;
            if rt.epoch != epoch {
                // A newer child replaced this one while we were waiting.
                return;
            }
            rt.pid = None;
            self.done_tx.send_modify(|n| *n += 1);

            if self.cancel.is_cancelled() {
                rt.state = WorkerState::Idle;
                return;
            }

            if rt.restart_requested {
                rt.restart_requested = false;
                rt.skip_next_restart = false;
                rt.crash_count = 0;
                rt.state = WorkerState::Idle;
                drop(rt);
                info!(worker = %self.id, "worker exited for restart, respawning");
                if let Err(e) = self.start().await {
                    error!(worker = %self.id, err = %e, "restart failed");
                }
                return;
            }

            if rt.intentional_stop {
                rt.state = WorkerState::Idle;
                info!(worker = %self.id, "worker stopped");
                return;
            }

            if rt.skip_next_restart {
                rt.skip_next_restart = false;
                rt.state = WorkerState::Idle;
                return;
            }

            if clean {
                rt.state = WorkerState::Idle;
                rt.crash_count = 0;
                info!(worker = %self.id, "worker exited");
                return;
            }

            rt.state = WorkerState::Crashed;
            warn!(worker = %self.id, status = ?status.ok(), "worker exited unexpectedly");

            if !self.auto_restart {
                return;
            }

            let backoff = crash_backoff(rt.crash_count);
            let now = Instant::now();
            let delay = match rt.last_crash_at {
                Some(prev) if now.duration_since(prev) < backoff => {
                    backoff - now.duration_since(prev)
                }
                _ => backoff,
            };
            rt.crash_count += 1;
            rt.last_crash_at = Some(now);
            drop(rt);

            warn!(worker = %self.id, delay = ?delay, "scheduling crash restart");
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                tokio::select! {
                    _ = worker.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if let Err(e) = worker.start().await {
                            error!(worker = %worker.id, err = %e, "crash restart failed");
                        }
                    }
                }
            });
        })
    }

    /// Stop the worker: soft interrupt, hard kill after 2 s, and wait for the
    /// monitor to observe the exit (bounded by 3 s).
    pub async fn stop(&self) {
        let mut done = self.done_tx.subscribe();
        let pid = {
            let mut rt = self.state.lock().await;
            rt.intentional_stop = true;
            if let Some(watcher) = rt.watcher.take() {
                watcher.close();
            }
            if !matches!(rt.state, WorkerState::Running | WorkerState::Starting) {
                rt.state = WorkerState::Idle;
                return;
            }
            rt.state = WorkerState::Stopping;
            rt.pid
        };
        info!(worker = %self.id, "stopping worker");

        let Some(pid) = pid else { return };
        send_signal(pid, Signal::SIGINT);

        if tokio::time::timeout(STOP_SOFT_GRACE, done.changed()).await.is_err() {
            send_signal(pid, Signal::SIGKILL);
            let _ = tokio::time::timeout(STOP_DONE_WAIT, done.changed()).await;
        }
    }

    /// Restart the worker (operator action or hot reload).
    ///
    /// The impending exit is flagged so crash handling does not also fire;
    /// the monitor respawns as soon as the child is gone.
    pub async fn restart(self: &Arc<Self>) {
        let pid = {
            let mut rt = self.state.lock().await;
            if !matches!(rt.state, WorkerState::Running) {
                drop(rt);
                if let Err(e) = self.start().await {
                    error!(worker = %self.id, err = %e, "restart failed");
                }
                return;
            }
            rt.restart_requested = true;
            rt.skip_next_restart = true;
            rt.crash_count = 0;
            rt.pid
        };
        info!(worker = %self.id, "restarting worker");

        let Some(pid) = pid else { return };
        send_signal(pid, Signal::SIGINT);

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_SOFT_GRACE).await;
            let still_running = {
                let rt = worker.state.lock().await;
                rt.pid == Some(pid)
            };
            if still_running {
                send_signal(pid, Signal::SIGKILL);
            }
        });
    }
}

fn send_signal(pid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
        debug!(pid, ?sig, err = %e, "signal delivery failed");
    }
}

/// Forward child output line-by-line, tagged with a coloured worker id.
async fn pipe_prefixed<R>(reader: R, id: String, color: &'static str, to_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if to_stderr {
            eprintln!("{color}[{id}]{ANSI_RESET} {line}");
        } else {
            println!("{color}[{id}]{ANSI_RESET} {line}");
        }
    }
}

const ANSI_PALETTE: [&str; 12] = [
    "\x1b[91m", // bright red
    "\x1b[92m", // bright green
    "\x1b[93m", // bright yellow
    "\x1b[94m", // bright blue
    "\x1b[95m", // bright magenta
    "\x1b[96m", // bright cyan
    "\x1b[31m", // red
    "\x1b[32m", // green
    "\x1b[33m", // yellow
    "\x1b[34m", // blue
    "\x1b[35m", // magenta
    "\x1b[36m", // cyan
];

const ANSI_RESET: &str = "\x1b[0m";

/// Deterministic colour for a worker id (32-bit FNV-1a mod palette size).
pub(crate) fn color_for(id: &str) -> &'static str {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in id.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    ANSI_PALETTE[hash as usize % ANSI_PALETTE.len()]
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
