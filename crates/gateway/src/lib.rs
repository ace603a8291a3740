// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Edge gateway fronting a fleet of locally-spawned microservice workers.
//!
//! HTTP requests are proxied by URL namespace onto per-worker UNIX sockets;
//! WebSockets are authenticated, registered, and bridged onto the message
//! bus so subscribed workers receive them. Workers drive control operations
//! back through the bus.

pub mod bus;
pub mod config;
pub mod error;
pub mod ident;
pub mod ipc;
pub mod plugins;
pub mod proxy;
pub mod secrets;
pub mod services;
pub mod state;
pub mod ws;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::Bus;
use crate::config::Cli;
use crate::ipc::IpcListener;
use crate::plugins::PluginRegistry;
use crate::proxy::custom_route::CustomRouteProxy;
use crate::secrets::SecretSource;
use crate::services::registry::ServiceRegistry;
use crate::services::{Supervisor, SupervisorOptions};
use crate::state::{Gateway, PRODUCT_NAME, VERSION};
use crate::ws::auth::JwtVerifier;
use crate::ws::WsManager;

/// Run the gateway until shutdown.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    run_with_secrets(cli, None).await
}

/// Run with an optional secret store backend (the remote collaborator is
/// injected by embedders; the CLI runs without one).
pub async fn run_with_secrets(
    cli: Cli,
    secret_source: Option<Box<dyn SecretSource>>,
) -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let root = cli.project_root()?;
    let debug = std::env::var("DEBUG").map(|v| v == "true").unwrap_or(false);

    let mut config = config::load(&root)?;
    if config.ipc.path.as_os_str().is_empty() {
        anyhow::bail!("config.ipc.path is required");
    }
    let project = config::load_package_json(&root);
    info!("[{PRODUCT_NAME} v{VERSION}]");

    let bootloader = config.services.bootloader_path(&root);
    if !bootloader.exists() {
        anyhow::bail!("bootloader not found at {}", bootloader.display());
    }

    let discovered = services::scan::scan_services(&root)?;
    if discovered.is_empty() {
        anyhow::bail!("no services found under {}", root.join("services").display());
    }
    info!(count = discovered.len(), "services discovered");

    let secret_env = secrets::resolve(secret_source.as_deref())?;
    if let Some(secret) = secret_env.get("JWT_SECRET") {
        if !secret.is_empty() {
            config.jwt.secret = Some(secret.clone());
        }
    }

    let shutdown = CancellationToken::new();

    let bus = Bus::connect(&config.bus, debug).await?;

    let supervisor = Supervisor::new(
        SupervisorOptions {
            bootloader,
            ipc_path: config.ipc.path.clone(),
            root: root.clone(),
            base_env: secret_env,
            watch: config.is_dev(),
            auto_restart: config.is_dev() || debug,
        },
        shutdown.child_token(),
    );
    let registry = Arc::new(ServiceRegistry::new());
    let plugins = Arc::new(PluginRegistry::new());

    let verifier = JwtVerifier::from_config(&config.jwt)?;
    let ws = WsManager::new(Some(Arc::clone(&bus)), Arc::clone(&plugins), verifier);
    ws.wire_bus();
    bus.start_listeners(shutdown.child_token()).await?;

    let mut custom_routes = Vec::with_capacity(config.routes.len());
    for route in &config.routes {
        custom_routes.push(CustomRouteProxy::new(route.clone())?);
    }

    plugins::load_scripts(&config.scripts, &root)?;

    let ipc = IpcListener::bind(&config.ipc.path)?;
    ipc.register_handler(
        "service:register",
        ipc::events::service_register_handler(
            Arc::clone(&supervisor),
            Arc::clone(&registry),
            bus.events(),
        ),
    );
    ipc.start().await?;

    for service in discovered {
        supervisor.add(service).await;
    }
    supervisor.start_all().await?;

    let gw = Arc::new(Gateway {
        config,
        root,
        project,
        start_time: Instant::now(),
        sys_info: state::sys_info(),
        debug,
        bus: Some(Arc::clone(&bus)),
        supervisor: Arc::clone(&supervisor),
        registry,
        ws,
        custom_routes,
        shutdown: shutdown.clone(),
    });

    let router = proxy::build_router(Arc::clone(&gw));

    let addr = format!("0.0.0.0:{}", gw.config.http.port);
    let listener =
        TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP listening on {addr}");
    let sd = shutdown.clone();
    let http_router = router.clone();
    tokio::spawn(async move {
        let result = axum::serve(listener, http_router)
            .with_graceful_shutdown(sd.cancelled_owned())
            .await;
        if let Err(e) = result {
            error!("HTTP server error: {e}");
        }
    });

    if let (Some(secure_port), Some(certificates)) =
        (gw.config.http.secure_port, gw.config.http.certificates.clone())
    {
        let tls = RustlsConfig::from_pem_file(&certificates.cert, &certificates.key)
            .await
            .context("failed to load TLS certificates")?;
        let addr: std::net::SocketAddr = format!("0.0.0.0:{secure_port}").parse()?;
        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            sd.cancelled().await;
            stopper.graceful_shutdown(Some(Duration::from_secs(1)));
        });
        let tls_router = router.clone();
        info!("HTTPS listening on {addr}");
        tokio::spawn(async move {
            let result =
                axum_server::bind_rustls(addr, tls).handle(handle).serve(tls_router.into_make_service()).await;
            if let Err(e) = result {
                error!("HTTPS server error: {e}");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    info!("stopping IPC socket");
    ipc.stop().await;
    info!("stopping all services");
    supervisor.stop_all().await;
    for id in supervisor.worker_ids().await {
        gw.registry.remove_namespace(&id);
        bus.unregister_service_events(&id);
    }
    info!("all done");
    Ok(())
}
