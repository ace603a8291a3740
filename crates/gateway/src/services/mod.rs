// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervision: spawning, monitoring, hot reload, and the arena of
//! workers keyed by service id.

pub mod registry;
pub mod scan;
pub mod watcher;
pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::services::scan::DiscoveredService;
use crate::services::watcher::RESTART_QUEUE_DEPTH;
use crate::services::worker::{Worker, WorkerOptions};

pub struct SupervisorOptions {
    pub bootloader: PathBuf,
    pub ipc_path: PathBuf,
    pub root: PathBuf,
    pub base_env: HashMap<String, String>,
    /// Attach file watchers for hot reload (dev mode).
    pub watch: bool,
    /// Restart crashed workers with back-off (dev mode or `DEBUG=true`).
    pub auto_restart: bool,
}

/// Owns every worker by id. Components refer to workers by id and resolve
/// them here at use.
pub struct Supervisor {
    options: SupervisorOptions,
    workers: RwLock<HashMap<String, Arc<Worker>>>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self { options, workers: RwLock::new(HashMap::new()), cancel })
    }

    /// Create a worker for a discovered service entrypoint.
    pub async fn add(&self, service: DiscoveredService) -> Arc<Worker> {
        let mut env = self.options.base_env.clone();
        env.insert("LB_SOCKET_MODE".to_owned(), "true".to_owned());
        env.insert(
            "LB_GATEWAY_SOCKET".to_owned(),
            self.options.ipc_path.to_string_lossy().into_owned(),
        );
        env.insert("ROOT_PATH".to_owned(), self.options.root.to_string_lossy().into_owned());

        let worker = Worker::new(WorkerOptions {
            id: service.id.clone(),
            main_path: service.main_path,
            cwd: service.cwd,
            env,
            bootloader: self.options.bootloader.clone(),
            auto_restart: self.options.auto_restart,
            cancel: self.cancel.child_token(),
        });
        info!(worker = %service.id, "worker created");

        self.workers.write().await.insert(service.id, Arc::clone(&worker));
        worker
    }

    /// Start a worker and, in dev mode, attach its hot-reload watcher.
    pub async fn start(&self, id: &str) -> anyhow::Result<()> {
        let Some(worker) = self.worker(id).await else {
            anyhow::bail!("unknown worker: {id}");
        };
        worker.start().await?;

        if self.options.watch {
            let (restart_tx, mut restart_rx) = mpsc::channel::<()>(RESTART_QUEUE_DEPTH);
            let handle =
                watcher::watch(&worker.cwd, restart_tx, worker.cancel_token().child_token())?;
            worker.attach_watcher(handle).await;

            let worker_for_reload = Arc::clone(&worker);
            tokio::spawn(async move {
                while restart_rx.recv().await.is_some() {
                    info!(worker = %worker_for_reload.id, "source changed, hot reloading");
                    worker_for_reload.restart().await;
                }
            });
        }
        Ok(())
    }

    pub async fn start_all(&self) -> anyhow::Result<()> {
        let ids: Vec<String> = self.workers.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.start(&id).await {
                error!(worker = %id, err = %e, "failed to start worker");
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn worker(&self, id: &str) -> Option<Arc<Worker>> {
        self.workers.read().await.get(id).cloned()
    }

    pub async fn worker_ids(&self) -> Vec<String> {
        self.workers.read().await.keys().cloned().collect()
    }

    /// Stop every worker and cancel their scopes.
    pub async fn stop_all(&self) {
        let workers: Vec<Arc<Worker>> = self.workers.read().await.values().cloned().collect();
        for worker in workers {
            worker.stop().await;
            worker.cancel_token().cancel();
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
