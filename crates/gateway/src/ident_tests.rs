// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

#[test]
fn ids_are_url_safe_and_long_enough() {
    for _ in 0..64 {
        let id = super::connection_id();
        assert!(id.len() >= 10, "id too short: {id}");
        assert!(
            id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "id not url-safe: {id}"
        );
    }
}

#[test]
fn ids_do_not_collide_in_a_small_sample() {
    let ids: HashSet<String> = (0..1024).map(|_| super::connection_id()).collect();
    assert_eq!(ids.len(), 1024);
}
