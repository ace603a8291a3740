// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::state::{Gateway, PRODUCT_NAME, VERSION};

/// Permissive CORS for every surface the gateway exposes.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Base middleware: product header, preflight short-circuit, debug timing.
pub async fn base_layer(
    State(gw): State<Arc<Gateway>>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let mut res = if method == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    if let (Ok(name), Ok(value)) =
        (HeaderName::from_bytes(PRODUCT_NAME.as_bytes()), HeaderValue::from_str(VERSION))
    {
        res.headers_mut().insert(name, value);
    }
    res.headers_mut().remove(header::SERVER);

    if gw.debug {
        debug!(
            %method,
            status = res.status().as_u16(),
            path = %path,
            elapsed = ?started.elapsed(),
            "request"
        );
    }
    res
}
