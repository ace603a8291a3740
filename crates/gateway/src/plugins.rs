// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed plugin host.
//!
//! Plugins register handlers for gateway lifecycle events by name. The host
//! here is a compile-time registry; alternative implementations (WASM, a
//! sub-process) satisfy the same trait without the core depending on any
//! script engine.

use std::collections::HashMap;
use std::path::Path;

use std::sync::Arc;

use crate::config::ScriptConfig;

pub type PluginHandler = Arc<dyn Fn(&str, &serde_json::Value) + Send + Sync>;

/// Registration surface offered to plugins.
pub trait PluginHost: Send + Sync {
    fn on_event(&self, name: &str, handler: PluginHandler);
}

/// In-process plugin registry.
#[derive(Default)]
pub struct PluginRegistry {
    handlers: parking_lot::RwLock<HashMap<String, Vec<PluginHandler>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan an event out to every handler registered for it.
    pub fn emit(&self, name: &str, payload: &serde_json::Value) {
        let handlers: Vec<PluginHandler> = {
            let map = self.handlers.read();
            map.get(name).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(name, payload);
        }
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.read().get(name).map_or(0, Vec::len)
    }
}

impl PluginHost for PluginRegistry {
    fn on_event(&self, name: &str, handler: PluginHandler) {
        self.handlers.write().entry(name.to_owned()).or_default().push(handler);
    }
}

/// Resolve configured plugin scripts against the project root.
///
/// Script execution belongs to an external plugin host; the core only
/// validates that each entry exists, honoring `crash_if_failed`.
pub fn load_scripts(scripts: &[ScriptConfig], root: &Path) -> anyhow::Result<()> {
    for script in scripts {
        let path = if script.path.is_absolute() {
            script.path.clone()
        } else {
            root.join(&script.path)
        };
        if path.exists() {
            tracing::debug!(path = %path.display(), "plugin script resolved");
        } else if script.crash_if_failed {
            anyhow::bail!("plugin script not found: {}", path.display());
        } else {
            tracing::warn!(path = %path.display(), "plugin script not found, skipping");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod tests;
