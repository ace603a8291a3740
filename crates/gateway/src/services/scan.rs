// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service discovery: `<root>/services/**/*.service.{js,ts}`.

use std::path::{Path, PathBuf};

/// A service entrypoint found on disk. The id is the first dot-separated
/// element of the file name; the worker's cwd is the entrypoint's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub id: String,
    pub main_path: PathBuf,
    pub cwd: PathBuf,
}

pub fn scan_services(root: &Path) -> anyhow::Result<Vec<DiscoveredService>> {
    let base = root.join("services");
    let mut found = Vec::new();
    if !base.is_dir() {
        return Ok(found);
    }

    let mut stack = vec![base];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir)?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !(name.ends_with(".service.js") || name.ends_with(".service.ts")) {
                continue;
            }
            let Some(id) = name.split('.').next().filter(|id| !id.is_empty()) else {
                continue;
            };
            let cwd = path.parent().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
            found.push(DiscoveredService { id: id.to_owned(), main_path: path, cwd });
        }
    }

    found.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(found)
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
