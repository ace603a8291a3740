// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Generate a URL-safe connection identifier.
///
/// 21 characters from the 64-symbol nanoid alphabet (`A-Za-z0-9_-`).
pub fn connection_id() -> String {
    nanoid::nanoid!()
}

#[cfg(test)]
#[path = "ident_tests.rs"]
mod tests;
