// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: socket id → connection, user id → connection set.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Per-connection context attached to the socket's session slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionCtx {
    #[serde(rename = "socket_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

impl ConnectionCtx {
    /// `meta["user_id"]` when present and non-empty.
    pub fn user_id(&self) -> Option<&str> {
        self.meta.get("user_id").map(String::as_str).filter(|id| !id.is_empty())
    }
}

/// One live WebSocket. Writes from any task are serialized through the
/// outbound channel, which the socket's writer task drains in order.
pub struct Connection {
    outbound: mpsc::Sender<Message>,
    ctx: RwLock<Option<Arc<ConnectionCtx>>>,
}

impl Connection {
    pub fn new(outbound: mpsc::Sender<Message>) -> Arc<Self> {
        Arc::new(Self { outbound, ctx: RwLock::new(None) })
    }

    /// Connection plus the receiving half its writer task drains.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send_text(&self, text: String) -> anyhow::Result<()> {
        self.outbound
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| anyhow::anyhow!("connection closed"))
    }

    pub async fn ctx(&self) -> Option<Arc<ConnectionCtx>> {
        self.ctx.read().await.clone()
    }

    async fn set_ctx(&self, ctx: Arc<ConnectionCtx>) {
        *self.ctx.write().await = Some(ctx);
    }

    async fn take_ctx(&self) -> Option<Arc<ConnectionCtx>> {
        self.ctx.write().await.take()
    }
}

/// A user's connection ids, behind its own mutex.
#[derive(Default)]
pub struct UserConnections {
    conns: parking_lot::Mutex<BTreeSet<String>>,
}

impl UserConnections {
    /// Snapshot of the ids. Taken before any I/O on the members.
    pub fn keys(&self) -> Vec<String> {
        self.conns.lock().iter().cloned().collect()
    }

    fn insert(&self, id: &str) {
        self.conns.lock().insert(id.to_owned());
    }

    /// Remove an id, reporting whether the set is now empty.
    fn remove(&self, id: &str) -> bool {
        let mut conns = self.conns.lock();
        conns.remove(id);
        conns.is_empty()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<String, Arc<Connection>>>,
    users: parking_lot::Mutex<HashMap<String, Arc<UserConnections>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an id, attach the context, and index the connection. Returns
    /// the finalized context.
    pub async fn add(&self, conn: Arc<Connection>, mut ctx: ConnectionCtx) -> Arc<ConnectionCtx> {
        ctx.id = crate::ident::connection_id();
        let ctx = Arc::new(ctx);

        conn.set_ctx(Arc::clone(&ctx)).await;
        self.clients.write().await.insert(ctx.id.clone(), conn);

        if let Some(user_id) = ctx.user_id() {
            let refs = {
                let mut users = self.users.lock();
                Arc::clone(users.entry(user_id.to_owned()).or_default())
            };
            refs.insert(&ctx.id);
        }
        ctx
    }

    /// Remove a connection everywhere. Fails when no context is attached.
    pub async fn remove(&self, conn: &Connection) -> anyhow::Result<Arc<ConnectionCtx>> {
        let Some(ctx) = conn.take_ctx().await else {
            anyhow::bail!("connection context not found");
        };
        self.clients.write().await.remove(&ctx.id);

        if let Some(user_id) = ctx.user_id() {
            let mut users = self.users.lock();
            if let Some(refs) = users.get(user_id) {
                if refs.remove(&ctx.id) {
                    users.remove(user_id);
                }
            }
        }
        Ok(ctx)
    }

    pub async fn get_conn(&self, id: &str) -> Option<Arc<Connection>> {
        self.clients.read().await.get(id).cloned()
    }

    pub async fn get_ctx(&self, id: &str) -> Option<Arc<ConnectionCtx>> {
        match self.get_conn(id).await {
            Some(conn) => conn.ctx().await,
            None => None,
        }
    }

    pub async fn load_ctx(&self, conn: &Connection) -> Option<Arc<ConnectionCtx>> {
        conn.ctx().await
    }

    /// Snapshot of a user's connection ids (empty for unknown users).
    pub fn user_connections(&self, user_id: &str) -> Vec<String> {
        let refs = {
            let users = self.users.lock();
            users.get(user_id).cloned()
        };
        refs.map(|refs| refs.keys()).unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }
}

#[cfg(test)]
#[path = "connections_tests.rs"]
mod tests;
