// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket gateway: upgrade, authentication, ingress bridging onto the
//! bus, and the worker-facing downstream/operations handlers.

pub mod auth;
pub mod connections;
pub mod events;
pub mod operations;
pub mod pubsub;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::bus::Bus;
use crate::error::GatewayError;
use crate::plugins::PluginRegistry;
use crate::state::Gateway;
use crate::ws::auth::JwtVerifier;
use crate::ws::connections::{Connection, ConnectionCtx, ConnectionRegistry, OUTBOUND_QUEUE_DEPTH};
use crate::ws::operations::OperationResult;
use crate::ws::pubsub::TopicPubSub;

pub struct WsManager {
    pub connections: ConnectionRegistry,
    pub pubsub: TopicPubSub,
    pub bus: Option<Arc<Bus>>,
    pub plugins: Arc<PluginRegistry>,
    pub verifier: Option<JwtVerifier>,
}

impl WsManager {
    pub fn new(
        bus: Option<Arc<Bus>>,
        plugins: Arc<PluginRegistry>,
        verifier: Option<JwtVerifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections: ConnectionRegistry::new(),
            pubsub: TopicPubSub::new(),
            bus,
            plugins,
            verifier,
        })
    }

    /// Install the downstream and operations handlers on the bus.
    pub fn wire_bus(self: &Arc<Self>) {
        let Some(bus) = &self.bus else {
            return;
        };

        let mgr = Arc::clone(self);
        bus.set_downstream_handler(Arc::new(move |msg| {
            let mgr = Arc::clone(&mgr);
            Box::pin(async move { mgr.handle_downstream(msg).await })
        }));

        let mgr = Arc::clone(self);
        bus.set_operation_handler(Arc::new(move |msg| {
            let mgr = Arc::clone(&mgr);
            Box::pin(async move { mgr.handle_operation(msg).await })
        }));
    }

    /// `downstream` subject: push the payload to one connection as a text
    /// frame. Missing or unknown sockets get an error reply.
    async fn handle_downstream(&self, msg: async_nats::Message) {
        let socket_id = header_value(&msg, "socket_id");
        let Some(socket_id) = socket_id else {
            self.reply_error(&msg, "socket_id not specified").await;
            return;
        };
        let Some(conn) = self.connections.get_conn(&socket_id).await else {
            self.reply_error(&msg, "socket_id not connected").await;
            return;
        };

        let text = String::from_utf8_lossy(&msg.payload).into_owned();
        if let Err(e) = conn.send_text(text).await {
            debug!(socket_id = %socket_id, err = %e, "downstream write failed");
        }
    }

    /// `operations` subject: dispatch the typed envelope and always publish
    /// exactly one reply.
    async fn handle_operation(&self, msg: async_nats::Message) {
        let socket_id = header_value(&msg, "socket_id");
        let result = operations::handle_operation_payload(
            &self.connections,
            &self.pubsub,
            &msg.payload,
            socket_id.as_deref(),
        )
        .await;

        let payload = serde_json::to_vec(&result)
            .unwrap_or_else(|_| br#"{"ok":false,"error":"reply serialization failed"}"#.to_vec());
        if let Some(bus) = &self.bus {
            bus.reply(&msg, Bytes::from(payload)).await;
        }
    }

    async fn reply_error(&self, msg: &async_nats::Message, error: &str) {
        let Some(bus) = &self.bus else {
            return;
        };
        let payload = serde_json::to_vec(&OperationResult::err(error)).unwrap_or_default();
        bus.reply(msg, Bytes::from(payload)).await;
    }
}

fn header_value(msg: &async_nats::Message, name: &str) -> Option<String> {
    msg.headers
        .as_ref()
        .and_then(|headers| headers.get(name))
        .map(|value| value.as_str().to_owned())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws` — authenticate and upgrade.
pub async fn ws_handler(
    State(gw): State<Arc<Gateway>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(ws) = ws else {
        return GatewayError::UpgradeRejected
            .to_http_response("This endpoint only supports WebSocket connection upgrades")
            .into_response();
    };

    let token = auth::extract_token(&headers, query.token.as_deref()).unwrap_or_default();
    let mut ctx = ConnectionCtx { token: token.clone(), ..Default::default() };

    match &gw.ws.verifier {
        Some(verifier) if !token.is_empty() => match verifier.verify(&token) {
            Ok(claims) => {
                ctx.authorized = true;
                ctx.meta = verifier.project_claims(&claims);
            }
            Err(e) => {
                debug!(err = %e, "websocket token rejected");
                return GatewayError::AuthInvalid.to_http_response("Unauthorized").into_response();
            }
        },
        Some(_) => {}
        None => ctx.authorized = !token.is_empty(),
    }

    let mgr = Arc::clone(&gw.ws);
    ws.on_upgrade(move |socket| handle_socket(mgr, socket, ctx)).into_response()
}

/// Per-connection lifecycle: register, greet, bridge, clean up.
async fn handle_socket(mgr: Arc<WsManager>, socket: WebSocket, ctx: ConnectionCtx) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbound_rx) = Connection::channel(OUTBOUND_QUEUE_DEPTH);

    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let ctx = mgr.connections.add(Arc::clone(&conn), ctx).await;
    on_open(&mgr, &conn, &ctx).await;

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => on_message(&mgr, &conn, &ctx, text.as_str()).await,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    if let Ok(ctx) = mgr.connections.remove(&conn).await {
        events::emit_disconnection(&mgr, &ctx).await;
    }
}

async fn on_open(mgr: &WsManager, conn: &Connection, ctx: &ConnectionCtx) {
    let connected = serde_json::json!({
        "event": "connected",
        "data": { "id": ctx.id, "authenticated": ctx.authorized, "meta": ctx.meta },
    });
    let _ = conn.send_text(connected.to_string()).await;

    if ctx.authorized {
        let authed = serde_json::json!({
            "event": "user:authed",
            "data": { "user_id": ctx.user_id() },
        });
        let _ = conn.send_text(authed.to_string()).await;
    } else {
        let _ = conn.send_text(r#"{"event":"user:unauthorized"}"#.to_owned()).await;
    }

    events::emit_connection(mgr, ctx).await;
}

/// Ingress: answer pings locally, bridge everything else onto the owning
/// worker's subject. Events no service registered are dropped.
async fn on_message(mgr: &WsManager, conn: &Connection, ctx: &ConnectionCtx, text: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    let Some(event) = value.get("event").and_then(|e| e.as_str()) else {
        return;
    };
    if event.is_empty() {
        return;
    }

    if event == "ping" {
        let _ = conn.send_text(r#"{"event":"pong"}"#.to_owned()).await;
        return;
    }

    let Some(bus) = &mgr.bus else {
        return;
    };
    let Some(namespace) = bus.lookup_service_by_event(event) else {
        return;
    };

    let mut headers = async_nats::HeaderMap::new();
    for (key, value) in &ctx.meta {
        headers.insert(key.as_str(), value.as_str());
    }
    headers.insert("event", event);
    headers.insert("token", ctx.token.as_str());
    headers.insert("socket_id", ctx.id.as_str());

    bus.publish_to_ipc(&namespace, event, headers, Bytes::copy_from_slice(text.as_bytes())).await;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
