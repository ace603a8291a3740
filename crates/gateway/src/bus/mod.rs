// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-bus client.
//!
//! Connects to the local broker, declares the `IPC` and `GLOBAL` jetstream
//! streams, and runs the core subscriptions the WebSocket gateway hangs its
//! handlers on:
//!
//! - `ipc.<namespace>` — gateway → worker, WebSocket ingress
//! - `downstream`      — worker → gateway, push bytes to one connection
//! - `operations`      — worker → gateway, request/reply control
//! - `global.<event>`  — gateway → any subscriber, lifecycle events

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BusConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub type BusHandler = Arc<dyn Fn(async_nats::Message) -> BoxFuture<'static, ()> + Send + Sync>;
pub type UpstreamTransformer = Arc<dyn Fn(&mut UpstreamPayload) + Send + Sync>;

/// A message headed from the gateway to a worker subject.
pub struct UpstreamPayload {
    pub event: String,
    pub headers: async_nats::HeaderMap,
    pub payload: Bytes,
}

/// WebSocket event name → owning namespace, read-mostly.
#[derive(Default)]
pub struct ServiceEventMap {
    entries: RwLock<HashMap<String, String>>,
}

impl ServiceEventMap {
    pub fn register(&self, namespace: &str, event: &str) {
        self.entries.write().insert(event.to_owned(), namespace.to_owned());
        info!(event, namespace, "registered service event");
    }

    /// Drop every event owned by a namespace. Idempotent.
    pub fn unregister_namespace(&self, namespace: &str) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, ns| ns != namespace);
        let cleared = before - entries.len();
        if cleared > 0 {
            info!(namespace, cleared, "unregistered service events");
        }
    }

    pub fn lookup(&self, event: &str) -> Option<String> {
        self.entries.read().get(event).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

pub struct Bus {
    client: async_nats::Client,
    jetstream: async_nats::jetstream::Context,
    events: Arc<ServiceEventMap>,
    downstream_handler: RwLock<Option<BusHandler>>,
    operation_handler: RwLock<Option<BusHandler>>,
    upstream_transformer: RwLock<Option<UpstreamTransformer>>,
    debug: bool,
}

impl Bus {
    /// Connect to the broker and declare the gateway streams.
    pub async fn connect(config: &BusConfig, debug: bool) -> anyhow::Result<Arc<Self>> {
        let client = tokio::time::timeout(
            CONNECT_TIMEOUT,
            async_nats::ConnectOptions::new().connect(&config.url),
        )
        .await
        .context("timed out connecting to the message broker")?
        .with_context(|| format!("failed to connect to the message broker at {}", config.url))?;

        tokio::time::timeout(READY_TIMEOUT, client.flush())
            .await
            .context("timed out waiting for the message broker to become ready")??;
        info!(url = %config.url, "broker connected");

        let jetstream = async_nats::jetstream::new(client.clone());
        for (name, subject) in [("IPC", "ipc.>"), ("GLOBAL", "global.>")] {
            jetstream
                .get_or_create_stream(async_nats::jetstream::stream::Config {
                    name: name.to_owned(),
                    subjects: vec![subject.into()],
                    storage: async_nats::jetstream::stream::StorageType::Memory,
                    retention: async_nats::jetstream::stream::RetentionPolicy::WorkQueue,
                    discard: async_nats::jetstream::stream::DiscardPolicy::Old,
                    max_age: STREAM_MAX_AGE,
                    num_replicas: 1,
                    ..Default::default()
                })
                .await
                .with_context(|| format!("failed to declare stream {name}"))?;
        }

        Ok(Arc::new(Self {
            client,
            jetstream,
            events: Arc::new(ServiceEventMap::default()),
            downstream_handler: RwLock::new(None),
            operation_handler: RwLock::new(None),
            upstream_transformer: RwLock::new(None),
            debug,
        }))
    }

    pub fn set_downstream_handler(&self, handler: BusHandler) {
        *self.downstream_handler.write() = Some(handler);
    }

    pub fn set_operation_handler(&self, handler: BusHandler) {
        *self.operation_handler.write() = Some(handler);
    }

    pub fn set_upstream_transformer(&self, transformer: UpstreamTransformer) {
        *self.upstream_transformer.write() = Some(transformer);
    }

    pub fn events(&self) -> Arc<ServiceEventMap> {
        Arc::clone(&self.events)
    }

    pub fn register_service_event(&self, namespace: &str, event: &str) {
        self.events.register(namespace, event);
    }

    pub fn unregister_service_events(&self, namespace: &str) {
        self.events.unregister_namespace(namespace);
    }

    pub fn lookup_service_by_event(&self, event: &str) -> Option<String> {
        self.events.lookup(event)
    }

    /// Subscribe to `downstream` and `operations` and dispatch to the
    /// configured handlers until shutdown. Messages on a subject are handled
    /// in delivery order.
    pub async fn start_listeners(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut downstream =
            self.client.subscribe("downstream").await.context("subscribe downstream")?;
        let mut operations =
            self.client.subscribe("operations").await.context("subscribe operations")?;

        let bus = Arc::clone(self);
        let sd = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    msg = downstream.next() => {
                        let Some(msg) = msg else { break };
                        let handler = bus.downstream_handler.read().clone();
                        if let Some(handler) = handler {
                            handler(msg).await;
                        }
                    }
                }
            }
        });

        let bus = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    msg = operations.next() => {
                        let Some(msg) = msg else { break };
                        let handler = bus.operation_handler.read().clone();
                        if let Some(handler) = handler {
                            let started = std::time::Instant::now();
                            handler(msg).await;
                            if bus.debug {
                                debug!(elapsed = ?started.elapsed(), "operation handled");
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Publish a WebSocket ingress message to a worker's subject.
    pub async fn publish_to_ipc(
        &self,
        namespace: &str,
        event: &str,
        headers: async_nats::HeaderMap,
        payload: Bytes,
    ) {
        let mut upstream = UpstreamPayload { event: event.to_owned(), headers, payload };
        let transformer = self.upstream_transformer.read().clone();
        if let Some(transformer) = transformer {
            transformer(&mut upstream);
        }

        debug!(event = %upstream.event, namespace, "publishing event to service");
        let subject = format!("ipc.{namespace}");
        if let Err(e) =
            self.jetstream.publish_with_headers(subject, upstream.headers, upstream.payload).await
        {
            warn!(namespace, err = %e, "ipc publish failed");
        }
    }

    /// Publish a gateway lifecycle event for any subscriber.
    pub async fn publish_to_global(&self, event: &str, payload: Bytes) {
        let subject = format!("global.{event}");
        if let Err(e) = self.jetstream.publish(subject, payload).await {
            warn!(event, err = %e, "global publish failed");
        }
    }

    /// Reply to a request message, echoing its headers.
    pub async fn reply(&self, msg: &async_nats::Message, payload: Bytes) {
        let Some(reply) = msg.reply.clone() else {
            debug!(subject = %msg.subject, "no reply subject on request");
            return;
        };
        let headers = msg.headers.clone().unwrap_or_default();
        if let Err(e) = self.client.publish_with_headers(reply, headers, payload).await {
            warn!(err = %e, "reply publish failed");
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
