// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration for the gateway.
//!
//! Loaded once at startup from `<root>/gateway.config.json`; the project's
//! `package.json` is read alongside it for the health snapshot. The core
//! consumes the typed value only — no config is re-read at runtime.

use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use indexmap::IndexMap;
use serde::Deserialize;

/// Command line surface for the gateway binary.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "edgegate", version)]
pub struct Cli {
    /// Project root containing `gateway.config.json` and `services/`.
    /// Defaults to the current directory.
    pub root: Option<PathBuf>,
}

impl Cli {
    pub fn project_root(&self) -> anyhow::Result<PathBuf> {
        match &self.root {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: String,
    pub http: HttpConfig,
    pub ipc: IpcConfig,
    pub services: ServicesConfig,
    pub jwt: JwtConfig,
    pub bus: BusConfig,
    pub routes: Vec<CustomRouteConfig>,
    pub scripts: Vec<ScriptConfig>,
}

impl GatewayConfig {
    /// Dev mode enables file watching and (together with `DEBUG`) automatic
    /// crash restarts.
    pub fn is_dev(&self) -> bool {
        self.mode == "dev"
    }

    fn normalized(mut self) -> Self {
        if self.mode.is_empty() {
            self.mode = "dev".to_owned();
        }
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub secure_port: Option<u16>,
    pub certificates: Option<CertificatesConfig>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8000, secure_port: None, certificates: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificatesConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Path of the gateway-side UNIX socket workers dial at boot. Required.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Worker launcher binary. Defaults to the linebridge bootloader under
    /// the project's `node_modules`.
    pub bootloader: Option<PathBuf>,
}

impl ServicesConfig {
    pub fn bootloader_path(&self, root: &Path) -> PathBuf {
        match &self.bootloader {
            Some(path) => path.clone(),
            None => root.join("node_modules/linebridge/bootloader/bin"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    #[serde(alias = "secret_B64")]
    pub secret_b64: Option<String>,
    pub private_key: Option<String>,
    #[serde(alias = "private_key_B64")]
    pub private_key_b64: Option<String>,
    pub public_key: Option<String>,
    #[serde(alias = "public_key_B64")]
    pub public_key_b64: Option<String>,
    /// Claim selectors projected into a connection's `meta`.
    pub use_keys: Vec<ClaimSelector>,
}

impl JwtConfig {
    /// Resolved HS256 secret, preferring the plain value over the base64 one.
    pub fn secret_material(&self) -> anyhow::Result<Option<String>> {
        resolve_material(self.secret.as_deref(), self.secret_b64.as_deref(), "jwt.secret_B64")
    }

    /// Resolved ES256 public key PEM.
    pub fn public_key_material(&self) -> anyhow::Result<Option<String>> {
        resolve_material(
            self.public_key.as_deref(),
            self.public_key_b64.as_deref(),
            "jwt.public_key_B64",
        )
    }
}

fn resolve_material(
    plain: Option<&str>,
    b64: Option<&str>,
    what: &str,
) -> anyhow::Result<Option<String>> {
    if let Some(value) = plain {
        if !value.is_empty() {
            return Ok(Some(value.to_owned()));
        }
    }
    if let Some(encoded) = b64 {
        if !encoded.is_empty() {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .with_context(|| format!("{what} is not valid base64"))?;
            let decoded =
                String::from_utf8(bytes).with_context(|| format!("{what} is not valid UTF-8"))?;
            return Ok(Some(decoded));
        }
    }
    Ok(None)
}

/// A JWT claim projected into connection `meta`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSelector {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ClaimKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    String,
    Bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { url: "nats://127.0.0.1:4222".to_owned() }
    }
}

/// A configured static route proxied to an external target.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomRouteConfig {
    pub path: String,
    pub target: String,
    /// Ordered rewrite rules: literal `^`-prefix patterns, optionally ending
    /// in a `(.*)` wildcard substituted for `$1` in the replacement.
    #[serde(default)]
    pub path_rewrite: IndexMap<String, String>,
    /// WebSocket proxying is not implemented; such routes answer 501.
    #[serde(default)]
    pub websocket: bool,
    /// Allow insecure TLS towards the target.
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub crash_if_failed: bool,
}

/// Project metadata surfaced in the health snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Read `<root>/gateway.config.json`.
pub fn load(root: &Path) -> anyhow::Result<GatewayConfig> {
    let path = root.join("gateway.config.json");
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: GatewayConfig = serde_json::from_str(&contents)
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(config.normalized())
}

/// Read `<root>/package.json` if present.
pub fn load_package_json(root: &Path) -> Option<PackageJson> {
    let contents = std::fs::read_to_string(root.join("package.json")).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
