// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process topic fan-out.
//!
//! Subscribers are connections, held weakly and keyed by connection id so a
//! closed socket never outlives its subscriptions. Publishing snapshots the
//! subscriber list under the read lock and writes with no lock held.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::ws::connections::Connection;

#[derive(Default)]
pub struct TopicPubSub {
    topics: RwLock<HashMap<String, BTreeMap<String, Weak<Connection>>>>,
}

impl TopicPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, id: &str, conn: &Arc<Connection>) {
        self.topics
            .write()
            .entry(topic.to_owned())
            .or_default()
            .insert(id.to_owned(), Arc::downgrade(conn));
    }

    pub fn unsubscribe(&self, topic: &str, id: &str) {
        let mut topics = self.topics.write();
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Write `text` to every live subscriber; returns how many received it.
    /// Dead subscriptions found along the way are pruned.
    pub async fn publish(&self, topic: &str, text: &str) -> usize {
        let (live, dead) = {
            let topics = self.topics.read();
            let Some(subscribers) = topics.get(topic) else {
                return 0;
            };
            let mut live = Vec::with_capacity(subscribers.len());
            let mut dead = Vec::new();
            for (id, weak) in subscribers {
                match weak.upgrade() {
                    Some(conn) => live.push(conn),
                    None => dead.push(id.clone()),
                }
            }
            (live, dead)
        };

        for conn in &live {
            let _ = conn.send_text(text.to_owned()).await;
        }

        if !dead.is_empty() {
            let mut topics = self.topics.write();
            if let Some(subscribers) = topics.get_mut(topic) {
                for id in &dead {
                    subscribers.remove(id);
                }
                if subscribers.is_empty() {
                    topics.remove(topic);
                }
            }
        }
        live.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, BTreeMap::len)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }
}

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;
