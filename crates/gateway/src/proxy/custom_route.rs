// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configured static routes proxied to external targets.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use tracing::warn;

use crate::config::CustomRouteConfig;
use crate::error::GatewayError;

const ROUTE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

/// Headers that must not travel through a proxy hop.
const HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub struct CustomRouteProxy {
    route: CustomRouteConfig,
    client: reqwest::Client,
}

impl CustomRouteProxy {
    pub fn new(route: CustomRouteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(ROUTE_TIMEOUT)
            .danger_accept_invalid_certs(route.insecure)
            .build()?;
        Ok(Self { route, client })
    }

    pub fn path(&self) -> &str {
        &self.route.path
    }

    /// Whether a request path falls under this route's prefix.
    pub fn matches(&self, path: &str) -> bool {
        path == self.route.path
            || (path.starts_with(&self.route.path)
                && path.as_bytes().get(self.route.path.len()) == Some(&b'/'))
    }

    pub async fn forward(&self, req: Request) -> Response {
        if self.route.websocket && is_websocket_upgrade(req.headers()) {
            return (
                StatusCode::NOT_IMPLEMENTED,
                axum::Json(crate::error::ErrorMessage {
                    message: "WebSocket proxying not yet implemented for custom routes".to_owned(),
                }),
            )
                .into_response();
        }

        let (parts, body) = req.into_parts();
        let body = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return GatewayError::UpstreamUnavailable
                    .to_http_response(e.to_string())
                    .into_response()
            }
        };

        let rewritten = rewrite_path(parts.uri.path(), &self.route);
        let url = join_target(&self.route.target, &rewritten);

        let mut headers = parts.headers;
        strip_hop_headers(&mut headers);
        headers.remove(header::HOST);

        let result = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match result {
            Err(e) if e.is_timeout() => {
                warn!(url = %url, "custom route timed out");
                GatewayError::UpstreamTimeout.to_http_response("Request timeout").into_response()
            }
            Err(e) => {
                warn!(url = %url, err = %e, "custom route transport error");
                GatewayError::UpstreamUnavailable.to_http_response(e.to_string()).into_response()
            }
            Ok(resp) => {
                let status = resp.status();
                let mut headers = resp.headers().clone();
                strip_hop_headers(&mut headers);
                match resp.bytes().await {
                    Ok(bytes) => (status, headers, bytes).into_response(),
                    Err(e) => GatewayError::UpstreamUnavailable
                        .to_http_response(e.to_string())
                        .into_response(),
                }
            }
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"))
}

pub(crate) fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_HEADERS {
        headers.remove(name);
    }
}

/// Rewrite a request path for the target: configured rules first, falling
/// back to stripping the route prefix.
pub(crate) fn rewrite_path(path: &str, route: &CustomRouteConfig) -> String {
    if !route.path_rewrite.is_empty() {
        return apply_path_rewrite(path, &route.path_rewrite);
    }
    let stripped = path.strip_prefix(route.path.as_str()).unwrap_or(path);
    let stripped = if stripped.is_empty() { "/" } else { stripped };
    collapse_slashes(stripped)
}

/// Apply the first matching rewrite rule, in configuration order.
///
/// A pattern is a literal prefix (a leading `^` is dropped); a trailing
/// `(.*)` captures the remainder, substituted for `$1` in the replacement.
pub(crate) fn apply_path_rewrite(path: &str, rules: &IndexMap<String, String>) -> String {
    for (pattern, replacement) in rules {
        let clean = pattern.strip_prefix('^').unwrap_or(pattern);
        if let Some(prefix) = clean.strip_suffix("(.*)") {
            if let Some(remaining) = path.strip_prefix(prefix) {
                return collapse_slashes(&replacement.replacen("$1", remaining, 1));
            }
        } else if path.starts_with(clean) {
            return collapse_slashes(&path.replacen(clean, replacement, 1));
        }
    }
    path.to_owned()
}

/// `target + path` with a single slash at the seam.
pub(crate) fn join_target(target: &str, path: &str) -> String {
    let mut url = target.trim_end_matches('/').to_owned();
    url.push('/');
    if path != "/" {
        url.push_str(path.trim_start_matches('/'));
    }
    url
}

fn collapse_slashes(s: &str) -> String {
    s.replace("//", "/")
}

#[cfg(test)]
#[path = "custom_route_tests.rs"]
mod tests;
