// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::config::{GatewayConfig, PackageJson};
use crate::proxy::custom_route::CustomRouteProxy;
use crate::services::registry::ServiceRegistry;
use crate::services::Supervisor;
use crate::ws::WsManager;

pub const PRODUCT_NAME: &str = "edgegate";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The process singleton owning every component. Constructed once at
/// startup and passed explicitly; no other mutable global exists.
pub struct Gateway {
    pub config: GatewayConfig,
    pub root: PathBuf,
    pub project: Option<PackageJson>,
    pub start_time: Instant,
    pub sys_info: serde_json::Value,
    pub debug: bool,
    pub bus: Option<Arc<Bus>>,
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<ServiceRegistry>,
    pub ws: Arc<WsManager>,
    pub custom_routes: Vec<CustomRouteProxy>,
    pub shutdown: CancellationToken,
}

/// Host facts for the health snapshot.
pub fn sys_info() -> serde_json::Value {
    serde_json::json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "cpu_cores": std::thread::available_parallelism().map(usize::from).unwrap_or(1),
    })
}
