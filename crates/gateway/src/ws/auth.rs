// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token extraction and JWT verification for WebSocket upgrades.

use std::collections::HashMap;

use anyhow::Context;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::config::{ClaimKind, ClaimSelector, JwtConfig};

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    selectors: Vec<ClaimSelector>,
}

impl JwtVerifier {
    /// Build a verifier from the JWT config: an ES256 key pair when a public
    /// key is configured, otherwise an HS256 shared secret. `None` when no
    /// material is configured (tokens pass unverified).
    pub fn from_config(config: &JwtConfig) -> anyhow::Result<Option<Self>> {
        let (key, algorithm) = if let Some(pem) = config.public_key_material()? {
            let key = DecodingKey::from_ec_pem(pem.as_bytes()).context("invalid jwt.public_key")?;
            (key, Algorithm::ES256)
        } else if let Some(secret) = config.secret_material()? {
            (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
        } else {
            return Ok(None);
        };

        // Expiry is checked when present; tokens without one stay valid.
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = Default::default();

        Ok(Some(Self { key, validation, selectors: config.use_keys.clone() }))
    }

    /// Verify a token and return its claims. Only the configured algorithm
    /// is accepted.
    pub fn verify(&self, token: &str) -> anyhow::Result<serde_json::Value> {
        let data = jsonwebtoken::decode::<serde_json::Value>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }

    /// Project whitelisted claims into connection `meta`.
    pub fn project_claims(&self, claims: &serde_json::Value) -> HashMap<String, String> {
        project(claims, &self.selectors)
    }
}

/// Typed claim projection: only whitelisted keys survive, booleans are
/// serialized as `"true"`/`"false"`.
pub(crate) fn project(
    claims: &serde_json::Value,
    selectors: &[ClaimSelector],
) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    for selector in selectors {
        let Some(value) = claims.get(&selector.key) else {
            continue;
        };
        match selector.kind {
            ClaimKind::String => {
                if let Some(s) = value.as_str() {
                    meta.insert(selector.key.clone(), s.to_owned());
                }
            }
            ClaimKind::Bool => {
                if let Some(b) = value.as_bool() {
                    meta.insert(selector.key.clone(), b.to_string());
                }
            }
        }
    }
    meta
}

/// Token from `Authorization: Bearer …`, else the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_owned());
            }
        }
    }
    query_token.filter(|t| !t.is_empty()).map(str::to_owned)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
