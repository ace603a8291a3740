// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control operations workers issue over the `operations` subject.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ws::connections::{Connection, ConnectionCtx, ConnectionRegistry};
use crate::ws::pubsub::TopicPubSub;

/// Reply for every operation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self { ok: true, data: None, error: None }
    }

    pub fn ok_with(data: serde_json::Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(message.into()) }
    }
}

/// Inbound envelope: `{type, data}` where each type owns a known data shape.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ByTopic {
    #[serde(default)]
    topic: String,
}

#[derive(Debug, Deserialize)]
struct ByUserId {
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ByUserIdSend {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    data: serde_json::Value,
}

type Caller = Option<(Arc<Connection>, Arc<ConnectionCtx>)>;

/// Parse and dispatch one operation request. Always produces exactly one
/// result; errors never escape to the caller's connection.
pub(crate) async fn handle_operation_payload(
    connections: &ConnectionRegistry,
    pubsub: &TopicPubSub,
    payload: &[u8],
    socket_id: Option<&str>,
) -> OperationResult {
    let envelope: Envelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(_) => return OperationResult::err("Failed to unmarshal operation"),
    };
    if envelope.kind.is_empty() {
        return OperationResult::err("Invalid operation type");
    }

    let caller = resolve_caller(connections, socket_id).await;
    debug!(operation = %envelope.kind, "operation request");

    match envelope.kind.as_str() {
        "subscribeToTopic" => subscribe_to_topic(pubsub, caller, envelope.data),
        "unsubscribeToTopic" => unsubscribe_from_topic(pubsub, caller, envelope.data),
        "findClientsByUserId" => find_clients_by_user_id(connections, envelope.data).await,
        "sendToUserId" => send_to_user_id(connections, envelope.data).await,
        "sendToTopic" => send_to_topic(pubsub, envelope.data).await,
        _ => OperationResult::err("Operation type not found"),
    }
}

async fn resolve_caller(connections: &ConnectionRegistry, socket_id: Option<&str>) -> Caller {
    let id = socket_id.filter(|id| !id.is_empty())?;
    let conn = connections.get_conn(id).await?;
    let ctx = conn.ctx().await?;
    Some((conn, ctx))
}

fn subscribe_to_topic(
    pubsub: &TopicPubSub,
    caller: Caller,
    data: serde_json::Value,
) -> OperationResult {
    let Some((conn, ctx)) = caller else {
        return OperationResult::err("socket_id not connected");
    };
    let op: ByTopic = match serde_json::from_value::<ByTopic>(data) {
        Ok(op) if !op.topic.is_empty() => op,
        _ => return OperationResult::err("Invalid payload or missing topic"),
    };
    pubsub.subscribe(&op.topic, &ctx.id, &conn);
    OperationResult::ok_with(serde_json::json!({ "topic": op.topic }))
}

fn unsubscribe_from_topic(
    pubsub: &TopicPubSub,
    caller: Caller,
    data: serde_json::Value,
) -> OperationResult {
    let Some((_conn, ctx)) = caller else {
        return OperationResult::err("socket_id not connected");
    };
    let op: ByTopic = match serde_json::from_value::<ByTopic>(data) {
        Ok(op) if !op.topic.is_empty() => op,
        _ => return OperationResult::err("Invalid payload or missing topic"),
    };
    pubsub.unsubscribe(&op.topic, &ctx.id);
    OperationResult::ok_with(serde_json::json!({ "topic": op.topic }))
}

async fn find_clients_by_user_id(
    connections: &ConnectionRegistry,
    data: serde_json::Value,
) -> OperationResult {
    let op: ByUserId = match serde_json::from_value(data) {
        Ok(op) => op,
        Err(_) => return OperationResult::err("Failed to parse payload"),
    };
    if op.user_id.is_empty() {
        return OperationResult::err("Missing user_id");
    }

    let ids = connections.user_connections(&op.user_id);
    let mut clients = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(ctx) = connections.get_ctx(&id).await {
            if let Ok(value) = serde_json::to_value(ctx.as_ref()) {
                clients.push(value);
            }
        }
    }
    OperationResult::ok_with(serde_json::Value::Array(clients))
}

async fn send_to_user_id(
    connections: &ConnectionRegistry,
    data: serde_json::Value,
) -> OperationResult {
    let op: ByUserIdSend = match serde_json::from_value::<ByUserIdSend>(data) {
        Ok(op) if !op.user_id.is_empty() => op,
        _ => return OperationResult::err("Invalid payload or missing target user_id"),
    };

    // One encoded frame reused across the whole fan-out.
    let text = op.data.to_string();
    for id in connections.user_connections(&op.user_id) {
        let Some(conn) = connections.get_conn(&id).await else {
            continue;
        };
        let _ = conn.send_text(text.clone()).await;
    }
    OperationResult::ok()
}

async fn send_to_topic(pubsub: &TopicPubSub, data: serde_json::Value) -> OperationResult {
    let op: ByTopic = match serde_json::from_value(data.clone()) {
        Ok(op) => op,
        Err(_) => return OperationResult::err("Failed to parse payload"),
    };
    if op.topic.is_empty() {
        return OperationResult::err("Invalid payload or missing topic");
    }

    // The whole data object travels to subscribers, encoded once.
    let text = data.to_string();
    pubsub.publish(&op.topic, &text).await;
    OperationResult::ok()
}

#[cfg(test)]
#[path = "operations_tests.rs"]
mod tests;
