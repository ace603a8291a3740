// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: base endpoints, namespace reverse proxy, custom routes.

pub mod custom_route;
pub mod middleware;
pub mod unix;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use crate::error::GatewayError;
use crate::proxy::unix::ForwardError;
use crate::services::registry::first_segment;
use crate::state::{Gateway, PRODUCT_NAME};

const NO_SERVICE_MESSAGE: &str = "No service available for this namespace";
const NO_SOCKET_MESSAGE: &str = "No listen socket available for this service";

pub fn build_router(gw: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(index).head(ping))
        .route("/ping", get(ping))
        .route("/ws", get(crate::ws::ws_handler))
        .fallback(proxy_handler)
        .layer(axum::middleware::from_fn_with_state(Arc::clone(&gw), middleware::base_layer))
        .layer(middleware::cors_layer())
        .with_state(gw)
}

/// `GET /` — health snapshot.
async fn index(State(gw): State<Arc<Gateway>>) -> Json<serde_json::Value> {
    let mut data = serde_json::json!({
        "gateway": PRODUCT_NAME,
        "lb_version": crate::state::VERSION,
        "uptime": format!("{:?}", gw.start_time.elapsed()),
        "sys_info": gw.sys_info,
    });
    if let Some(project) = &gw.project {
        if let Some(name) = &project.name {
            data["name"] = serde_json::json!(name);
        }
        if let Some(version) = &project.version {
            data["version"] = serde_json::json!(version);
        }
    }
    Json(data)
}

/// `HEAD /` and `GET /ping`.
async fn ping() -> StatusCode {
    StatusCode::OK
}

/// Fallback: custom routes first, then first-segment namespace routing onto
/// the owning worker's UNIX socket.
async fn proxy_handler(State(gw): State<Arc<Gateway>>, req: Request) -> Response {
    let path = req.uri().path().to_owned();

    for route in &gw.custom_routes {
        if route.matches(&path) {
            return route.forward(req).await;
        }
    }

    let Some(namespace) = first_segment(&path)
        .and_then(|segment| gw.registry.namespace_for_segment(segment))
    else {
        return GatewayError::RouteMissing.to_http_response(NO_SERVICE_MESSAGE).into_response();
    };
    let worker = match gw.registry.worker_for_namespace(&namespace) {
        Some(worker_id) => gw.supervisor.worker(&worker_id).await,
        None => None,
    };
    let Some(worker) = worker else {
        return GatewayError::RouteMissing.to_http_response(NO_SERVICE_MESSAGE).into_response();
    };
    let Some(client) = worker.socket_client().await else {
        return GatewayError::UpstreamUnavailable.to_http_response(NO_SOCKET_MESSAGE).into_response();
    };

    let req = match rewrite_for_upstream(req) {
        Ok(req) => req,
        Err(e) => {
            return GatewayError::UpstreamUnavailable.to_http_response(e.to_string()).into_response()
        }
    };

    match client.forward(req).await {
        Ok(resp) => resp.into_response(),
        Err(ForwardError::Timeout) => {
            warn!(namespace = %namespace, "proxy deadline exceeded");
            GatewayError::UpstreamTimeout.to_http_response("Request timeout").into_response()
        }
        Err(ForwardError::Transport(message)) => {
            warn!(namespace = %namespace, err = %message, "proxy transport error");
            GatewayError::UpstreamUnavailable.to_http_response(message).into_response()
        }
    }
}

/// Re-target the request at the worker socket, keeping path, query, headers,
/// and the original `Host`.
fn rewrite_for_upstream(req: Request) -> Result<Request<Body>, axum::http::Error> {
    let (mut parts, body) = req.into_parts();
    let path_and_query =
        parts.uri.path_and_query().map(|pq| pq.as_str().to_owned()).unwrap_or_else(|| "/".into());
    parts.uri = Uri::builder()
        .scheme("http")
        .authority("localhost")
        .path_and_query(path_and_query)
        .build()?;
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
