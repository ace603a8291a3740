// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing tables for registered services.
//!
//! Two read-mostly maps: namespace → worker id (the supervisor arena key)
//! and first URL path segment → namespace.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Default)]
pub struct ServiceRegistry {
    namespaces: RwLock<HashMap<String, String>>,
    segments: RwLock<HashMap<String, String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_namespace(&self, namespace: &str, worker_id: &str) {
        self.namespaces.write().insert(namespace.to_owned(), worker_id.to_owned());
    }

    pub fn bind_segment(&self, segment: &str, namespace: &str) {
        self.segments.write().insert(segment.to_owned(), namespace.to_owned());
    }

    pub fn worker_for_namespace(&self, namespace: &str) -> Option<String> {
        self.namespaces.read().get(namespace).cloned()
    }

    pub fn namespace_for_segment(&self, segment: &str) -> Option<String> {
        self.segments.read().get(segment).cloned()
    }

    /// Remove a namespace and every URL segment pointing at it. Idempotent.
    pub fn remove_namespace(&self, namespace: &str) {
        self.namespaces.write().remove(namespace);
        self.segments.write().retain(|_, ns| ns != namespace);
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }
}

/// First non-empty `/`-separated segment of a URL path.
pub fn first_segment(path: &str) -> Option<&str> {
    path.split('/').find(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
