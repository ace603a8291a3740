// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for control-plane IPC events.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::bus::ServiceEventMap;
use crate::ipc::{EventData, IpcHandler};
use crate::services::registry::{first_segment, ServiceRegistry};
use crate::services::Supervisor;

/// `service:register` payload a worker sends once it is listening.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceRegisterPayload {
    pub namespace: String,
    pub secure: bool,
    pub http: HttpAdvert,
    pub websocket: WsAdvert,
    pub listen: ListenAdvert,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpAdvert {
    pub enabled: bool,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WsAdvert {
    pub enabled: bool,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListenAdvert {
    pub ip: String,
    pub port: u16,
    pub socket: String,
}

/// Build the `service:register` handler closure for the IPC listener.
pub fn service_register_handler(
    supervisor: Arc<Supervisor>,
    registry: Arc<ServiceRegistry>,
    events: Arc<ServiceEventMap>,
) -> IpcHandler {
    Arc::new(move |frame| {
        let supervisor = Arc::clone(&supervisor);
        let registry = Arc::clone(&registry);
        let events = Arc::clone(&events);
        Box::pin(async move {
            handle_service_register(&supervisor, &registry, &events, frame).await;
        })
    })
}

/// Apply a worker's advertisement to the routing tables, event map, and its
/// socket client. Repeating an identical registration is a no-op.
pub(crate) async fn handle_service_register(
    supervisor: &Supervisor,
    registry: &ServiceRegistry,
    events: &ServiceEventMap,
    frame: EventData,
) {
    let payload: ServiceRegisterPayload = match serde_json::from_value(frame.data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(err = %e, "invalid service:register payload");
            return;
        }
    };
    if payload.namespace.is_empty() {
        warn!("service:register without a namespace");
        return;
    }

    let Some(worker) = supervisor.worker(&payload.namespace).await else {
        warn!(namespace = %payload.namespace, "service not found");
        return;
    };

    info!(namespace = %payload.namespace, "registering service");
    registry.bind_namespace(&payload.namespace, &worker.id);

    if payload.http.enabled {
        for path in &payload.http.paths {
            if let Some(segment) = first_segment(path) {
                registry.bind_segment(segment, &payload.namespace);
            }
        }
    }

    if payload.websocket.enabled {
        for event in &payload.websocket.events {
            events.register(&payload.namespace, event);
        }
    }

    if !payload.listen.socket.is_empty() {
        worker.set_listen_socket(PathBuf::from(&payload.listen.socket)).await;
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
