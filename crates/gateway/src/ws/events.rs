// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal lifecycle events for WebSocket connections, mirrored to the
//! plugin host and onto the global bus subject.

use bytes::Bytes;

use crate::ws::connections::ConnectionCtx;
use crate::ws::WsManager;

pub const EVENT_CONNECTION: &str = "connection";
pub const EVENT_DISCONNECTION: &str = "disconnection";

pub(crate) async fn emit_connection(mgr: &WsManager, ctx: &ConnectionCtx) {
    emit(mgr, EVENT_CONNECTION, ctx).await;
}

pub(crate) async fn emit_disconnection(mgr: &WsManager, ctx: &ConnectionCtx) {
    emit(mgr, EVENT_DISCONNECTION, ctx).await;
}

async fn emit(mgr: &WsManager, event: &str, ctx: &ConnectionCtx) {
    let value = serde_json::to_value(ctx).unwrap_or(serde_json::Value::Null);
    mgr.plugins.emit(event, &value);

    if let Some(bus) = &mgr.bus {
        let payload = serde_json::to_vec(ctx).unwrap_or_default();
        bus.publish_to_global(event, Bytes::from(payload)).await;
    }
}
