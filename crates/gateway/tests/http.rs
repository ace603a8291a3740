// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway HTTP surface.
//!
//! Uses `axum_test::TestServer` — no real TCP needed. Worker sockets are
//! served over UNIX domain sockets in temp directories.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use edgegate::config::{CustomRouteConfig, GatewayConfig, PackageJson};
use edgegate::plugins::PluginRegistry;
use edgegate::proxy::custom_route::CustomRouteProxy;
use edgegate::proxy::build_router;
use edgegate::services::registry::ServiceRegistry;
use edgegate::services::scan::DiscoveredService;
use edgegate::services::{Supervisor, SupervisorOptions};
use edgegate::state::{sys_info, Gateway};
use edgegate::ws::WsManager;

fn test_supervisor() -> Arc<Supervisor> {
    Supervisor::new(
        SupervisorOptions {
            bootloader: "/bin/echo".into(),
            ipc_path: "/tmp/edgegate-test.sock".into(),
            root: "/tmp".into(),
            base_env: HashMap::new(),
            watch: false,
            auto_restart: false,
        },
        CancellationToken::new(),
    )
}

fn test_gateway(custom_routes: Vec<CustomRouteProxy>) -> Arc<Gateway> {
    Arc::new(Gateway {
        config: GatewayConfig::default(),
        root: "/tmp".into(),
        project: Some(PackageJson {
            name: Some("demo-project".to_owned()),
            version: Some("2.0.1".to_owned()),
        }),
        start_time: Instant::now(),
        sys_info: sys_info(),
        debug: false,
        bus: None,
        supervisor: test_supervisor(),
        registry: Arc::new(ServiceRegistry::new()),
        ws: WsManager::new(None, Arc::new(PluginRegistry::new()), None),
        custom_routes,
        shutdown: CancellationToken::new(),
    })
}

fn test_server(gw: Arc<Gateway>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(gw)).map_err(|e| anyhow::anyhow!("test server: {e}"))
}

/// Serve a router over a UNIX socket the way a worker would.
async fn serve_worker_socket(router: Router, path: &Path) -> anyhow::Result<()> {
    let listener = tokio::net::UnixListener::bind(path)?;
    tokio::spawn(async move {
        let mut make_svc = router.into_make_service();
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let svc_future = <_ as tower::Service<_>>::call(&mut make_svc, ());
            tokio::spawn(async move {
                let Ok(svc) = svc_future.await;
                let io = hyper_util::rt::TokioIo::new(stream);
                let hyper_svc = hyper_util::service::TowerToHyperService::new(svc);
                let _ = hyper_util::server::conn::auto::Builder::new(
                    hyper_util::rt::TokioExecutor::new(),
                )
                .serve_connection_with_upgrades(io, hyper_svc)
                .await;
            });
        }
    });
    Ok(())
}

// ── base endpoints ────────────────────────────────────────────────────────

#[tokio::test]
async fn index_returns_the_health_snapshot() -> anyhow::Result<()> {
    let server = test_server(test_gateway(vec![]))?;
    let resp = server.get("/").await;
    assert_eq!(resp.status_code(), 200);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["gateway"], "edgegate");
    assert!(body["lb_version"].is_string());
    assert!(body["uptime"].is_string());
    assert!(body["sys_info"]["os"].is_string());
    assert!(body["sys_info"]["cpu_cores"].is_number());
    // package.json metadata rides along when present
    assert_eq!(body["name"], "demo-project");
    assert_eq!(body["version"], "2.0.1");
    Ok(())
}

#[tokio::test]
async fn ping_and_head_are_cheap_200s() -> anyhow::Result<()> {
    let server = test_server(test_gateway(vec![]))?;
    assert_eq!(server.get("/ping").await.status_code(), 200);
    assert_eq!(server.method(Method::HEAD, "/").await.status_code(), 200);
    Ok(())
}

#[tokio::test]
async fn responses_carry_the_product_header() -> anyhow::Result<()> {
    let server = test_server(test_gateway(vec![]))?;
    let resp = server.get("/ping").await;
    let value = resp
        .headers()
        .get("edgegate")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("missing product header"))?;
    assert!(!value.is_empty());
    assert!(resp.headers().get("server").is_none());
    Ok(())
}

#[tokio::test]
async fn plain_options_returns_200() -> anyhow::Result<()> {
    let server = test_server(test_gateway(vec![]))?;
    let resp = server.method(Method::OPTIONS, "/anything/at/all").await;
    assert_eq!(resp.status_code(), 200);
    Ok(())
}

// ── namespace proxy ───────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_namespace_is_a_502_with_a_message() -> anyhow::Result<()> {
    let server = test_server(test_gateway(vec![]))?;
    let resp = server.get("/nope/x").await;
    assert_eq!(resp.status_code(), 502);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["message"], "No service available for this namespace");
    Ok(())
}

#[tokio::test]
async fn registered_namespace_without_a_socket_is_a_502() -> anyhow::Result<()> {
    let gw = test_gateway(vec![]);
    gw.supervisor
        .add(DiscoveredService {
            id: "alpha".to_owned(),
            main_path: "main".into(),
            cwd: "/tmp".into(),
        })
        .await;
    gw.registry.bind_namespace("alpha", "alpha");
    gw.registry.bind_segment("alpha", "alpha");

    let server = test_server(gw)?;
    let resp = server.get("/alpha/v1/ping").await;
    assert_eq!(resp.status_code(), 502);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["message"], "No listen socket available for this service");
    Ok(())
}

#[tokio::test]
async fn registered_namespace_proxies_to_the_worker_socket() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("alpha.sock");
    let worker_app = Router::new().route("/alpha/v1/ping", get(|| async { "worker says pong" }));
    serve_worker_socket(worker_app, &socket).await?;

    let gw = test_gateway(vec![]);
    let worker = gw
        .supervisor
        .add(DiscoveredService {
            id: "alpha".to_owned(),
            main_path: "main".into(),
            cwd: "/tmp".into(),
        })
        .await;
    worker.set_listen_socket(socket).await;
    gw.registry.bind_namespace("alpha", "alpha");
    gw.registry.bind_segment("alpha", "alpha");

    let server = test_server(gw)?;
    let resp = server.get("/alpha/v1/ping").await;
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.text(), "worker says pong");
    Ok(())
}

#[tokio::test]
async fn worker_errors_surface_as_502_not_500() -> anyhow::Result<()> {
    let gw = test_gateway(vec![]);
    let worker = gw
        .supervisor
        .add(DiscoveredService {
            id: "alpha".to_owned(),
            main_path: "main".into(),
            cwd: "/tmp".into(),
        })
        .await;
    // A socket nobody serves: dialing it fails as a transport error.
    worker.set_listen_socket("/tmp/edgegate-nobody-listens.sock".into()).await;
    gw.registry.bind_namespace("alpha", "alpha");
    gw.registry.bind_segment("alpha", "alpha");

    let server = test_server(gw)?;
    let resp = server.get("/alpha/v1/ping").await;
    assert_eq!(resp.status_code(), 502);

    let body: serde_json::Value = resp.json();
    assert!(body["message"].is_string());
    Ok(())
}

// ── websocket upgrade ─────────────────────────────────────────────────────

#[tokio::test]
async fn ws_without_upgrade_headers_is_rejected_400() -> anyhow::Result<()> {
    let server = test_server(test_gateway(vec![]))?;
    let resp = server.get("/ws").await;
    assert_eq!(resp.status_code(), 400);

    let body: serde_json::Value = resp.json();
    assert!(body["message"].as_str().is_some_and(|m| m.contains("WebSocket")));
    Ok(())
}

// ── custom routes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn websocket_custom_route_answers_501() -> anyhow::Result<()> {
    let route = CustomRouteProxy::new(CustomRouteConfig {
        path: "/stream".to_owned(),
        target: "https://upstream.example.com".to_owned(),
        path_rewrite: Default::default(),
        websocket: true,
        insecure: false,
    })?;
    let server = test_server(test_gateway(vec![route]))?;

    let resp = server
        .get("/stream/live")
        .add_header(axum::http::header::UPGRADE, axum::http::HeaderValue::from_static("websocket"))
        .add_header(
            axum::http::header::CONNECTION,
            axum::http::HeaderValue::from_static("Upgrade"),
        )
        .await;
    assert_eq!(resp.status_code(), 501);
    Ok(())
}

#[tokio::test]
async fn custom_route_shadows_namespace_routing() -> anyhow::Result<()> {
    // The route matches /stream but the target is unreachable; the request
    // must fail at the custom route (502 from reqwest), not fall through to
    // the namespace lookup.
    let route = CustomRouteProxy::new(CustomRouteConfig {
        path: "/stream".to_owned(),
        target: "http://127.0.0.1:1".to_owned(),
        path_rewrite: Default::default(),
        websocket: false,
        insecure: false,
    })?;
    let server = test_server(test_gateway(vec![route]))?;

    let resp = server.get("/stream/live").await;
    assert_eq!(resp.status_code(), 502);
    let body: serde_json::Value = resp.json();
    assert_ne!(body["message"], "No service available for this namespace");
    Ok(())
}
