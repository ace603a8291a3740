// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::body::Body;
use axum::http::Request;
use indexmap::IndexMap;

use super::*;

fn route(path: &str, target: &str, rewrite: &[(&str, &str)]) -> CustomRouteConfig {
    CustomRouteConfig {
        path: path.to_owned(),
        target: target.to_owned(),
        path_rewrite: rewrite
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<IndexMap<String, String>>(),
        websocket: false,
        insecure: false,
    }
}

// ── matching ──────────────────────────────────────────────────────────────

#[test]
fn route_matches_its_prefix_only() -> anyhow::Result<()> {
    let proxy = CustomRouteProxy::new(route("/spectrum", "https://s.example.com", &[]))?;
    assert!(proxy.matches("/spectrum"));
    assert!(proxy.matches("/spectrum/live/123"));
    assert!(!proxy.matches("/spectrumx"));
    assert!(!proxy.matches("/other"));
    Ok(())
}

// ── rewriting ─────────────────────────────────────────────────────────────

#[test]
fn wildcard_rule_substitutes_the_remainder() {
    let rules: IndexMap<String, String> =
        IndexMap::from([("^/spectrum/(.*)".to_owned(), "/$1".to_owned())]);
    assert_eq!(apply_path_rewrite("/spectrum/live/123", &rules), "/live/123");
}

#[test]
fn literal_rule_replaces_the_prefix() {
    let rules: IndexMap<String, String> =
        IndexMap::from([("^/api".to_owned(), "/v2".to_owned())]);
    assert_eq!(apply_path_rewrite("/api/users", &rules), "/v2/users");
}

#[test]
fn rules_apply_in_configuration_order() {
    let rules: IndexMap<String, String> = IndexMap::from([
        ("^/spectrum/(.*)".to_owned(), "/$1".to_owned()),
        ("^/spectrum".to_owned(), "/".to_owned()),
    ]);
    assert_eq!(apply_path_rewrite("/spectrum/live", &rules), "/live");
    assert_eq!(apply_path_rewrite("/spectrum", &rules), "/");
}

#[test]
fn unmatched_path_passes_through() {
    let rules: IndexMap<String, String> =
        IndexMap::from([("^/spectrum/(.*)".to_owned(), "/$1".to_owned())]);
    assert_eq!(apply_path_rewrite("/other/path", &rules), "/other/path");
}

#[test]
fn double_slashes_are_collapsed() {
    let rules: IndexMap<String, String> =
        IndexMap::from([("^/a/(.*)".to_owned(), "//$1".to_owned())]);
    assert_eq!(apply_path_rewrite("/a/b", &rules), "/b");
}

#[test]
fn without_rules_the_route_prefix_is_stripped() {
    let cfg = route("/spectrum", "https://s.example.com", &[]);
    assert_eq!(rewrite_path("/spectrum/live", &cfg), "/live");
    assert_eq!(rewrite_path("/spectrum", &cfg), "/");
}

// ── url assembly ──────────────────────────────────────────────────────────

#[test]
fn join_target_seams_with_one_slash() {
    assert_eq!(join_target("https://s.example.com", "/live/1"), "https://s.example.com/live/1");
    assert_eq!(join_target("https://s.example.com/", "/live/1"), "https://s.example.com/live/1");
    assert_eq!(join_target("https://s.example.com", "/"), "https://s.example.com/");
}

// ── header hygiene ────────────────────────────────────────────────────────

#[test]
fn hop_headers_are_stripped() {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert("connection", axum::http::HeaderValue::from_static("keep-alive"));
    headers.insert("transfer-encoding", axum::http::HeaderValue::from_static("chunked"));
    headers.insert("x-custom", axum::http::HeaderValue::from_static("stays"));
    strip_hop_headers(&mut headers);
    assert!(headers.get("connection").is_none());
    assert!(headers.get("transfer-encoding").is_none());
    assert!(headers.get("x-custom").is_some());
}

// ── websocket routes ──────────────────────────────────────────────────────

#[tokio::test]
async fn websocket_route_answers_501() -> anyhow::Result<()> {
    let mut cfg = route("/stream", "https://s.example.com", &[]);
    cfg.websocket = true;
    let proxy = CustomRouteProxy::new(cfg)?;

    let req = Request::builder()
        .uri("/stream")
        .header("upgrade", "websocket")
        .header("connection", "Upgrade")
        .body(Body::empty())?;
    let resp = proxy.forward(req).await;
    assert_eq!(resp.status(), 501);
    Ok(())
}
