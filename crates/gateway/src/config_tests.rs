// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use super::*;

fn parse(json: &str) -> anyhow::Result<GatewayConfig> {
    Ok(serde_json::from_str::<GatewayConfig>(json)?.normalized())
}

#[test]
fn minimal_config_gets_defaults() -> anyhow::Result<()> {
    let config = parse(r#"{ "ipc": { "path": "/tmp/gw.sock" } }"#)?;
    assert_eq!(config.mode, "dev");
    assert!(config.is_dev());
    assert_eq!(config.http.port, 8000);
    assert_eq!(config.bus.url, "nats://127.0.0.1:4222");
    assert!(config.routes.is_empty());
    assert!(config.scripts.is_empty());
    Ok(())
}

#[test]
fn production_mode_is_not_dev() -> anyhow::Result<()> {
    let config = parse(r#"{ "mode": "production", "ipc": { "path": "/tmp/gw.sock" } }"#)?;
    assert!(!config.is_dev());
    Ok(())
}

#[test]
fn bootloader_defaults_under_node_modules() -> anyhow::Result<()> {
    let config = parse(r#"{ "ipc": { "path": "/tmp/gw.sock" } }"#)?;
    let path = config.services.bootloader_path(Path::new("/srv/app"));
    assert_eq!(path, PathBuf::from("/srv/app/node_modules/linebridge/bootloader/bin"));
    Ok(())
}

#[test]
fn explicit_bootloader_wins() -> anyhow::Result<()> {
    let config = parse(
        r#"{ "ipc": { "path": "/tmp/gw.sock" }, "services": { "bootloader": "/usr/bin/boot" } }"#,
    )?;
    assert_eq!(config.services.bootloader_path(Path::new("/srv/app")), PathBuf::from("/usr/bin/boot"));
    Ok(())
}

#[test]
fn jwt_secret_prefers_plain_over_base64() -> anyhow::Result<()> {
    let config = parse(
        r#"{ "ipc": { "path": "/tmp/gw.sock" },
             "jwt": { "secret": "plain", "secret_B64": "aWdub3JlZA==" } }"#,
    )?;
    assert_eq!(config.jwt.secret_material()?.as_deref(), Some("plain"));
    Ok(())
}

#[test]
fn jwt_base64_variant_is_decoded() -> anyhow::Result<()> {
    let config = parse(
        r#"{ "ipc": { "path": "/tmp/gw.sock" }, "jwt": { "secret_B64": "c2VjcmV0" } }"#,
    )?;
    assert_eq!(config.jwt.secret_material()?.as_deref(), Some("secret"));
    Ok(())
}

#[test]
fn jwt_invalid_base64_is_an_error() -> anyhow::Result<()> {
    let config = parse(
        r#"{ "ipc": { "path": "/tmp/gw.sock" }, "jwt": { "secret_B64": "%%%" } }"#,
    )?;
    assert!(config.jwt.secret_material().is_err());
    Ok(())
}

#[test]
fn claim_selectors_parse_typed() -> anyhow::Result<()> {
    let config = parse(
        r#"{ "ipc": { "path": "/tmp/gw.sock" },
             "jwt": { "use_keys": [
                 { "key": "user_id", "type": "string" },
                 { "key": "admin", "type": "bool" } ] } }"#,
    )?;
    assert_eq!(config.jwt.use_keys.len(), 2);
    assert_eq!(config.jwt.use_keys[0].key, "user_id");
    assert_eq!(config.jwt.use_keys[0].kind, ClaimKind::String);
    assert_eq!(config.jwt.use_keys[1].kind, ClaimKind::Bool);
    Ok(())
}

#[test]
fn custom_routes_keep_rewrite_order() -> anyhow::Result<()> {
    let config = parse(
        r#"{ "ipc": { "path": "/tmp/gw.sock" },
             "routes": [ {
                 "path": "/spectrum",
                 "target": "https://spectrum.example.com",
                 "path_rewrite": { "^/spectrum/(.*)": "/$1", "^/spectrum": "/" },
                 "websocket": false,
                 "insecure": true } ] }"#,
    )?;
    let route = &config.routes[0];
    let patterns: Vec<&String> = route.path_rewrite.keys().collect();
    assert_eq!(patterns, ["^/spectrum/(.*)", "^/spectrum"]);
    assert!(route.insecure);
    Ok(())
}

#[test]
fn load_reads_config_from_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut file = std::fs::File::create(dir.path().join("gateway.config.json"))?;
    write!(file, r#"{{ "mode": "dev", "ipc": {{ "path": "/tmp/gw.sock" }} }}"#)?;

    let config = load(dir.path())?;
    assert_eq!(config.ipc.path, PathBuf::from("/tmp/gw.sock"));
    Ok(())
}

#[test]
fn load_missing_config_is_an_error() {
    let Ok(dir) = tempfile::tempdir() else { return };
    assert!(load(dir.path()).is_err());
}

#[test]
fn package_json_is_optional_and_lenient() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(load_package_json(dir.path()).is_none());

    let mut file = std::fs::File::create(dir.path().join("package.json"))?;
    write!(file, r#"{{ "name": "my-app", "version": "1.2.3", "extra": true }}"#)?;
    let pkg = load_package_json(dir.path()).ok_or_else(|| anyhow::anyhow!("expected pkg"))?;
    assert_eq!(pkg.name.as_deref(), Some("my-app"));
    assert_eq!(pkg.version.as_deref(), Some("1.2.3"));
    Ok(())
}
