// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret store boundary.
//!
//! The remote secret backend is an external collaborator; the core only
//! consumes a resolved name→value map that is merged into every worker's
//! environment. A `JWT_SECRET` entry additionally overrides the configured
//! JWT secret.

use std::collections::HashMap;

/// Source of environment secrets injected into workers.
pub trait SecretSource: Send + Sync {
    fn load(&self) -> anyhow::Result<HashMap<String, String>>;
}

/// Credentials that trigger the secret store collaborator.
#[derive(Debug, Clone)]
pub struct SecretStoreCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub project_id: String,
}

impl SecretStoreCredentials {
    /// Read `INFISICAL_CLIENT_ID` / `INFISICAL_CLIENT_SECRET` /
    /// `INFISICAL_PROJECT_ID` from the process environment.
    pub fn from_env() -> Option<Self> {
        let client_id = non_empty_env("INFISICAL_CLIENT_ID")?;
        let client_secret = non_empty_env("INFISICAL_CLIENT_SECRET")?;
        let project_id = non_empty_env("INFISICAL_PROJECT_ID")?;
        Some(Self { client_id, client_secret, project_id })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Fixed secret map, used by embedders and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets(pub HashMap<String, String>);

impl SecretSource for StaticSecrets {
    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        Ok(self.0.clone())
    }
}

/// Resolve the secret environment for this gateway run.
///
/// The store is only consulted when its credentials are present in the
/// environment; with credentials but no wired backend the gateway starts
/// with an empty secret set.
pub fn resolve(source: Option<&dyn SecretSource>) -> anyhow::Result<HashMap<String, String>> {
    let Some(_creds) = SecretStoreCredentials::from_env() else {
        return Ok(HashMap::new());
    };
    match source {
        Some(source) => {
            tracing::info!("loading secret store environment");
            source.load()
        }
        None => {
            tracing::warn!("secret store credentials present but no backend is wired");
            Ok(HashMap::new())
        }
    }
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
